use std::path::PathBuf;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub chatterbox_api_key: String,
    pub chatterbox_base_url: String,
    pub admin_username: String,
    pub max_upload_mb: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| "PORT must be a number".to_string())?;
        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/registry.db".to_string());
        let uploads_dir =
            std::env::var("UPLOADS_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let chatterbox_api_key = std::env::var("CHATTERBOX_API_KEY")
            .map_err(|_| "CHATTERBOX_API_KEY must be set".to_string())?;
        let chatterbox_base_url = std::env::var("CHATTERBOX_BASE_URL")
            .unwrap_or_else(|_| "https://api.chatterbox.resemble.ai/v1".to_string());
        let admin_username =
            std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let max_upload_mb: u64 = std::env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| "MAX_UPLOAD_MB must be a number".to_string())?;

        Ok(Self {
            host,
            port,
            database_path: database_path.into(),
            uploads_dir: uploads_dir.into(),
            chatterbox_api_key,
            chatterbox_base_url,
            admin_username,
            max_upload_mb,
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}
