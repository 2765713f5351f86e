//! Mosaic Validator
//!
//! Semantic checks over a loaded compose configuration: duplicate ids,
//! dangling component/action/workflow references and job graph integrity.
//! Every check runs, so one pass reports every defect.

mod validator;

pub use validator::ComposeValidator;
