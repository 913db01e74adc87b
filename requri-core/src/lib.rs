//! Core of a declarative HTTP request task.
//!
//! A host hands over a flat parameter bag; `builder::build` validates it into
//! a `RequestConfig`, `mapper::execute` sends it through an `HttpClient`
//! implementation and flattens the response into a `ResponseRecord`, and
//! `outcome::run` ties the two together into a `TaskOutcome` the host can
//! branch on. The core never touches the network or the filesystem itself.

pub mod builder;
pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod links;
pub mod mapper;
pub mod outcome;
pub mod params;
pub mod record;

pub use builder::build;
pub use client::{HistoryEntry, HttpClient, RawResponse};
pub use config::{
    Body, ClientCert, Cookies, Credentials, FileField, HttpMethod, JarCookie, ProxyRule,
    RequestConfig, Timeout, Verify,
};
pub use error::{TaskError, TransportError, ValidationError};
pub use mapper::execute;
pub use outcome::{run, OutcomeDetail, TaskOutcome};
pub use record::ResponseRecord;
