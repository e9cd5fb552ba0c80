//! Service construction, ownership and scoped lookup.
//!
//! Makers registered in [`ServiceMakers`] build services into a
//! [`ServicesManager`]; a [`ServiceToken`] shares the manager and a
//! [`ServiceHandle`] resolves one service from it with the scope the
//! caller expects.

pub mod handle;
pub mod maker;
pub mod manager;
pub mod scope;
pub mod token;
pub mod tracer;
pub mod wrapper;

pub use handle::ServiceHandle;
pub use maker::{ServiceBuildContext, ServiceMaker, ServiceMakers};
pub use manager::ServicesManager;
pub use scope::{LegacyScope, PerScheduleScope, ScopeMarker, ServiceOverlap, ServiceScope, SharedScope};
pub use token::ServiceToken;
pub use tracer::{Tracer, TRACER_SERVICE};
pub use wrapper::{Service, ServiceInterface, ServiceWrapper, ServiceWrapperBase};
