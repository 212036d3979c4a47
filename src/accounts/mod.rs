use anyhow::Result;

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub full_name: String,
    pub description: String,
    pub password: String,
}

/// ローカルアカウント台帳への操作面。OS実装は `platform::windows`、テストはフェイクを使う。
pub trait AccountDirectory {
    fn exists(&self, username: &str) -> Result<bool>;
    fn create(&mut self, account: &NewAccount) -> Result<()>;
    fn set_enabled(&mut self, username: &str, enabled: bool) -> Result<()>;
    fn delete(&mut self, username: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileState {
    pub loaded: bool,
}

/// アカウントに紐づくユーザープロファイル（フォルダ+レジストリ）への操作面。
pub trait ProfileStore {
    fn find(&self, username: &str) -> Result<Option<ProfileState>>;
    fn delete(&mut self, username: &str) -> Result<()>;
}
