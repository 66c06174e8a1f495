mod client_error;

pub(crate) use client_error::map_ssh_error;
pub use client_error::{ClientError, ClientErrorKind};
