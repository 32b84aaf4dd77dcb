pub mod error;
pub mod request;
pub mod status;

pub use error::{FetchError, RenderError, TransferError, UploadError};
pub use request::{
    resolve_mime_type, ChatId, DisplayName, InboundMedia, RequestId, SourceHandle, StatusHandle,
    TransferRequest, DEFAULT_MIME_TYPE,
};
pub use status::{LinkButton, StatusView};
