use thiserror::Error;

use cpi_client::ClientError;
use cpi_common::SettingsError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}
