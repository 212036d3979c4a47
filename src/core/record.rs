#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
}

impl UserRecord {
    /// 姓が空でもそのまま連結する（出力フォーマットは末尾スペースを保持する）。
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
