use std::path::PathBuf;

fn fallback_dotenv_path(config_dir: Option<PathBuf>) -> Option<PathBuf> {
    let base = config_dir?;
    Some(base.join("syre-version-converter/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let Some(path) = fallback_dotenv_path(dirs::config_dir()) else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
