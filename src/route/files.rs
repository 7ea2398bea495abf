use std::path::PathBuf;

use rocket::fs::NamedFile;
use rocket::State;

use crate::config::Config;

/// Serves uploaded attachments and submission files.
///
/// `PathBuf` segments reject `..` so requests can't leave the upload directory.
#[get("/<path..>")]
#[tracing::instrument(skip(config))]
pub async fn uploaded_file(path: PathBuf, config: &State<Config>) -> Option<NamedFile> {
    let file = config.upload_dir.join(&path);
    match NamedFile::open(&file).await {
        Ok(it) => Some(it),
        Err(e) => {
            tracing::debug!("unable to serve '{}': {}", file.display(), e);
            None
        }
    }
}
