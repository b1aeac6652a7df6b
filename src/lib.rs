//! Deposit Relayer - Library interface
//!
//! Ingestion stage of the bridge relay: polls a source chain's deposit feed,
//! translates each deposit into a canonical transfer [`Message`] and hands it
//! to a [`Router`] for delivery to the destination chain.
//!
//! - **Listener** - retry-bounded, cancellable poll loop ([`listener`])
//! - **Translator** - deposit validation and conversion ([`translator`])
//! - **Sources** - upstream feed port and HTTP implementation ([`source`])
//! - **Router** - destination routing port and writer registry ([`router`])

pub mod bounded_cache;
pub mod config;
pub mod deposit;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod router;
pub mod server;
pub mod source;
pub mod translator;
pub mod types;

pub use config::{parse_chain_config, ChainConfig, Config, RawChainConfig};
pub use deposit::{DepositKind, DepositResponse, RawDeposit};
pub use error::{ConfigError, DispatchError, FetchError, ListenerError, TranslateError};
pub use listener::{Listener, PollMode, PollOutcome, PollPolicy};
pub use router::{ChainRouter, Router};
pub use source::{DepositSource, HttpDepositFeed};
pub use translator::DepositTranslator;
pub use types::{ChainId, Message, Nonce, ResourceId, TransferType};
