pub mod bundle_store;
pub mod chat_llm;
pub mod sst;
pub mod tts;

pub use bundle_store::JsonFileStore;
pub use chat_llm::OpenAiChatAdapter;
pub use sst::OpenAiSstAdapter;
pub use tts::OpenAiTtsAdapter;
