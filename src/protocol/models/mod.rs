pub mod common;
pub mod items;
pub mod response;
pub mod session;
pub mod tools;

pub use common::{ArbitraryJson, DEFAULT_MODEL, DEFAULT_VOICE, ItemStatus, JsonSchema, Modality, Role, Voice};
pub use items::Item;
pub use response::{Response, ResponseStatus};
pub use session::{AudioFormat, InputAudioTranscription, Session, SessionUpdate, TurnDetection};
pub use tools::{Tool, ToolChoice};
