//! Built-in modules.
pub mod core;
pub mod system;

pub use self::core::{CORE_MODULE_KEYNAME, CoreModule};
pub use self::system::{SERVICE_NAME_PARAMETER, SYSTEM_MODULE_KEYNAME, SystemModule};
