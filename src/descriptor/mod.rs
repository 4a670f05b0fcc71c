// src/descriptor/mod.rs

//! Build descriptors
//!
//! # Example
//!
//! ```yaml
//! type: java
//! license: Apache-2.0
//! env:
//!   MAVEN_OPTS: -Xmx1g
//! labels:
//!   team: payments
//! profiles:
//!   - name: jar
//!     default: true
//!     run:
//!       - mvn -q package
//!     target: target/app.jar
//! functions:
//!   - name: clean
//!     run:
//!       - rm -rf target
//! ```

mod format;
mod parser;

pub use format::{BuildDescriptor, DESCRIPTOR_FILE, Function, Profile};
pub use parser::{parse_descriptor, parse_descriptor_file, validate_descriptor};
