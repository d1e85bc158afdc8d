//! Trait seams for everything this engine treats as an external collaborator:
//! the LLM provider, the secondary (creditor-data) store, attachment
//! storage, and outbound notifications (§6). `cem-daemon` binds concrete
//! implementations at startup; every other crate depends only on these
//! traits, mirroring the teacher's narrow adapter-trait seams
//! (`mqk-execution::BrokerAdapter`).

pub mod llm;
pub mod notify;
pub mod secondary_store;
pub mod storage;

pub use llm::{LlmCapability, LlmError, LlmResponse};
pub use notify::{DebtUpdateNotice, NotificationSink};
pub use secondary_store::{
    ClientSelector, CreditorSelector, DebtUpdate, SecondaryClient, SecondaryCreditorRecord,
    SecondaryStoreAdapter, SecondaryStoreError,
};
pub use storage::{AttachmentStorage, ScopedFile, StorageError};
