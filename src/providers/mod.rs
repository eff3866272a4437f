mod error;
mod openai_compatible;

pub use error::{UpstreamError, UpstreamErrorKind};
pub use openai_compatible::{BufferedTurn, ChatBackend, UpstreamClient, UpstreamStream};
