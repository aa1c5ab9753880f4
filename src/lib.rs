//! Attack-path graph engine for Active Directory snapshots
//!
//! Loaders fill an [`Objects`] store and record compromise edges with
//! [`Object::pwns`]; [`analyze_objects`] and [`analyze_paths`] then derive
//! [`PwnGraph`]s from the loaded store.

pub mod analyze_objects;
pub mod analyze_paths;
pub mod attribute_value;
pub mod attributes;
pub mod config;
pub mod dn;
pub mod errors;
pub mod graph;
mod index;
pub mod loader;
pub mod object;
pub mod object_type;
pub mod objects;
pub mod probability;
pub mod pwn_method;
pub mod security_descriptor;
pub mod sid;
pub mod telemetry;
pub mod uac;

pub use analyze_objects::analyze_objects;
pub use analyze_paths::analyze_paths;
pub use attribute_value::{AttributeValue, AttributeValues};
pub use attributes::Attribute;
pub use config::{AnalyzeObjectsOptions, AnalyzePathsOptions, Direction, LoaderConfig};
pub use errors::{PwnError, Result};
pub use graph::{GraphObject, PwnConnection, PwnGraph};
pub use loader::{BulkLoader, LoadStats};
pub use object::{Object, ObjectId, PwnLink};
pub use object_type::ObjectType;
pub use objects::{ObjectStatistics, Objects};
pub use probability::{Probability, RiskLevel};
pub use pwn_method::{PwnMethod, PwnMethodBitmap};
pub use security_descriptor::{DescriptorCache, SecurityDescriptor};
pub use sid::Sid;
