use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::UserRecord;

/// プロビジョニング入力CSVを読む。必須列: UserName, FirstName, LastName, Department。
/// ユーザー名が空白のみの行は処理対象から除外する。
pub fn read_user_records(path: &Path) -> Result<Vec<UserRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("入力CSVの読み取りに失敗しました: {}", path.display()))?;
    parse_user_records(&text)
        .with_context(|| format!("入力CSVの解析に失敗しました: {}", path.display()))
}

/// クリーンアップ入力CSVを読む。必須列: UserName。
/// 空白エントリを捨て、重複を除き、ソートして返す。
pub fn read_cleanup_usernames(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("入力CSVの読み取りに失敗しました: {}", path.display()))?;
    parse_cleanup_usernames(&text)
        .with_context(|| format!("入力CSVの解析に失敗しました: {}", path.display()))
}

pub fn parse_user_records(text: &str) -> Result<Vec<UserRecord>> {
    let mut lines = non_blank_lines(text);
    let header = lines.next().ok_or_else(|| anyhow!("CSVが空です"))?;
    let columns = split_csv_line(header);

    let username_col = find_column(&columns, "UserName")?;
    let first_col = find_column(&columns, "FirstName")?;
    let last_col = find_column(&columns, "LastName")?;
    let dept_col = find_column(&columns, "Department")?;

    let mut records = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        let username = field(&fields, username_col).trim().to_string();
        if username.is_empty() {
            continue;
        }
        records.push(UserRecord {
            username,
            first_name: field(&fields, first_col).to_string(),
            last_name: field(&fields, last_col).to_string(),
            department: field(&fields, dept_col).to_string(),
        });
    }
    Ok(records)
}

pub fn parse_cleanup_usernames(text: &str) -> Result<Vec<String>> {
    let mut lines = non_blank_lines(text);
    let header = lines.next().ok_or_else(|| anyhow!("CSVが空です"))?;
    let columns = split_csv_line(header);
    let username_col = find_column(&columns, "UserName")?;

    let mut names: Vec<String> = lines
        .map(|line| {
            let fields = split_csv_line(line);
            field(&fields, username_col).trim().to_string()
        })
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
}

fn find_column(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow!("必須列がヘッダにありません: {name}"))
}

fn field(fields: &[String], idx: usize) -> &str {
    fields.get(idx).map(String::as_str).unwrap_or("")
}

/// 1行を最小限のCSV規則で分割する（ダブルクォート囲み、`""` のエスケープに対応）。
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cur.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                other => cur.push(other),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => fields.push(std::mem::take(&mut cur)),
                other => cur.push(other),
            }
        }
    }
    fields.push(cur);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_line_plain_fields() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn split_csv_line_quoted_fields() {
        assert_eq!(
            split_csv_line(r#""Doe, Jane",Eng"#),
            vec!["Doe, Jane", "Eng"]
        );
        assert_eq!(split_csv_line(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn parse_user_records_maps_columns_case_insensitively() {
        let csv = "username,FIRSTNAME,lastname,Department\njdoe,Jane,Doe,Eng\n";
        let records = parse_user_records(csv).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "jdoe");
        assert_eq!(records[0].first_name, "Jane");
        assert_eq!(records[0].last_name, "Doe");
        assert_eq!(records[0].department, "Eng");
    }

    #[test]
    fn parse_user_records_strips_bom_and_skips_blank_usernames() {
        let csv = "\u{feff}UserName,FirstName,LastName,Department\n  ,Jane,Doe,Eng\n\njdoe,Jane,,Eng\n";
        let records = parse_user_records(csv).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "jdoe");
        assert_eq!(records[0].last_name, "");
    }

    #[test]
    fn parse_user_records_rejects_missing_column() {
        let csv = "UserName,FirstName,Department\njdoe,Jane,Eng\n";
        let err = parse_user_records(csv).expect_err("missing LastName");
        assert!(err.to_string().contains("LastName"), "err={err}");
    }

    #[test]
    fn parse_cleanup_usernames_dedups_sorts_and_drops_blanks() {
        let csv = "UserName\nzeta\n  \nalpha\nzeta\n alpha \n";
        let names = parse_cleanup_usernames(csv).expect("parse");
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn parse_cleanup_usernames_requires_username_column() {
        let err = parse_cleanup_usernames("Name\njdoe\n").expect_err("no UserName column");
        assert!(err.to_string().contains("UserName"), "err={err}");
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_user_records("").is_err());
        assert!(parse_cleanup_usernames("\n\n").is_err());
    }
}
