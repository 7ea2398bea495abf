use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or_else(|_| "schoolportal".to_string())
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()))
}

fn default_public_url() -> String {
    env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8000/files".to_string())
}

fn default_session_secret() -> String {
    env::var("SESSION_SECRET").unwrap_or_else(|_| {
        let secret: [u8; 32] = rand::random();
        util::encode_base64(secret)
    })
}

fn default_session_days() -> i64 {
    7
}

fn default_bcrypt_cost() -> u32 {
    12
}

#[cfg(debug_assertions)]
fn default_bootstrap_coordinators() -> Vec<String> {
    vec![String::from("admin@localhost")]
}
#[cfg(not(debug_assertions))]
fn default_bootstrap_coordinators() -> Vec<String> {
    vec![]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default = "default_session_secret")]
    pub session_secret: String,
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    /// E-mails allowed to register as coordinators without an enrollment code.
    #[serde(default = "default_bootstrap_coordinators")]
    pub bootstrap_coordinators: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            upload_dir: default_upload_dir(),
            public_url: default_public_url(),
            session_secret: default_session_secret(),
            session_days: default_session_days(),
            bcrypt_cost: default_bcrypt_cost(),
            bootstrap_coordinators: default_bootstrap_coordinators(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        Config::load_from(config_dir())
    }

    pub fn load_from(dir: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
        let dir = dir.as_ref();
        let config_file =
            util::find_first_subpath(dir, &["settings.yml", "settings.yaml"], Path::exists)
                .ok_or_else(|| ConfigurationError::NotFound(dir.to_path_buf()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }
}
