pub mod auth_storage;
pub mod flow;
pub mod oauth_server;
pub mod token_data;

pub use auth_storage::{CredentialStore, Credentials};
pub use flow::{AuthFlow, BrowserLauncher, FlowState, SystemBrowser};
pub use oauth_server::{CallbackListener, CallbackParams, ShutdownHandle};
pub use token_data::{IdTokenInfo, TokenData};
