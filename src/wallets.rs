use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use ethers::signers::{
    LocalWallet,
    Signer,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeystoreDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl KeystoreDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_keystore_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".foundry").join("keystores"))
}

/// Accepts either a path to a keystore file or the name of one stored in
/// `dir`.
pub fn resolve_keystore(raw: &str, dir: &Path) -> Result<KeystoreDescriptor> {
    let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
    if expanded.is_file() {
        let name = expanded
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid keystore filename {:?}", expanded))?
            .to_owned();
        return Ok(KeystoreDescriptor::new(name, expanded));
    }
    find_keystore(dir, raw)
}

pub fn list_keystores(dir: &Path) -> Result<Vec<KeystoreDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut keystores = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read keystore directory")? {
        let entry = entry.wrap_err("Failed to read keystore entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let name = name.trim_end_matches(".json").to_owned();
        keystores.push(KeystoreDescriptor::new(name, path));
    }
    keystores.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(keystores)
}

pub fn find_keystore(dir: &Path, name: &str) -> Result<KeystoreDescriptor> {
    let keystores = list_keystores(dir)?;
    keystores
        .into_iter()
        .find(|k| k.name == name)
        .ok_or_else(|| eyre!("Keystore '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn unlock_keystore(descriptor: &KeystoreDescriptor, chain_id: u64) -> Result<LocalWallet> {
    let prompt = format!("Enter password for keystore '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read keystore password")?;
    decrypt_wallet(descriptor, password.as_bytes(), chain_id)
}

fn decrypt_wallet(
    descriptor: &KeystoreDescriptor,
    password: &[u8],
    chain_id: u64,
) -> Result<LocalWallet> {
    let secret = decrypt_key(&descriptor.path, password)
        .map_err(|_| eyre!("Invalid password for keystore '{}'", descriptor.name))?;
    let wallet = LocalWallet::from_bytes(&secret).map_err(|err| {
        eyre!(
            "Keystore '{}' contained unsupported key material: {err}",
            descriptor.name
        )
    })?;
    Ok(wallet.with_chain_id(chain_id))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    const SECRET: [u8; 32] = [0x42; 32];

    fn keystore_in(dir: &Path, name: &str) -> PathBuf {
        let mut rng = ethers::core::rand::thread_rng();
        eth_keystore::encrypt_key(dir, &mut rng, SECRET, "hunter2", Some(name))
            .expect("keystore written");
        dir.join(name)
    }

    #[test]
    fn list_keystores__sorted_and_hidden_files_skipped() {
        // given
        let tmp = TempDir::new("keystores").unwrap();
        keystore_in(tmp.path(), "zed");
        keystore_in(tmp.path(), "alice");
        fs::write(tmp.path().join(".DS_Store"), b"").unwrap();

        // when
        let names: Vec<String> = list_keystores(tmp.path())
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();

        // then
        assert_eq!(names, vec!["alice".to_string(), "zed".to_string()]);
    }

    #[test]
    fn list_keystores__missing_dir_is_empty() {
        let tmp = TempDir::new("keystores").unwrap();
        let missing = tmp.path().join("nope");
        assert!(list_keystores(&missing).unwrap().is_empty());
    }

    #[test]
    fn resolve_keystore__falls_back_to_name_lookup() {
        // given
        let tmp = TempDir::new("keystores").unwrap();
        let path = keystore_in(tmp.path(), "player");

        // when
        let by_name = resolve_keystore("player", tmp.path()).unwrap();
        let by_path = resolve_keystore(path.to_str().unwrap(), Path::new("/nowhere")).unwrap();

        // then
        assert_eq!(by_name.path, path);
        assert_eq!(by_path, by_name);
        assert!(resolve_keystore("ghost", tmp.path()).is_err());
    }

    #[test]
    fn decrypt_wallet__binds_chain_id_and_rejects_bad_password() {
        // given
        let tmp = TempDir::new("keystores").unwrap();
        keystore_in(tmp.path(), "player");
        let descriptor = find_keystore(tmp.path(), "player").unwrap();

        // when
        let wallet = decrypt_wallet(&descriptor, b"hunter2", 10143).unwrap();
        let wrong = decrypt_wallet(&descriptor, b"letmein", 10143);

        // then
        let expected = LocalWallet::from_bytes(&SECRET).unwrap();
        assert_eq!(wallet.address(), expected.address());
        assert_eq!(wallet.chain_id(), 10143);
        assert!(wrong.is_err());
    }
}
