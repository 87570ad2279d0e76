pub mod cache;
pub mod commands;
pub mod database;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod package;
pub mod plan;
pub mod runtime;
pub mod script;
pub mod search;
pub mod source;

pub use database::{DatabaseOptions, PackageDatabase};
pub use error::DatabaseError;
pub use package::{Package, PackageName};
pub use plan::{InstallationPlan, make_installation_plan};
