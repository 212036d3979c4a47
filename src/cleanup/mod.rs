use crate::accounts::{AccountDirectory, ProfileStore};
use crate::core::CleanupOutcome;

/// 1ユーザー名を処理し、発生した結果を発生順に返す。
/// どの段階の失敗もそのレコード内で握り、後続レコードへは波及させない。
pub fn process_entry(
    directory: &mut dyn AccountDirectory,
    profiles: &mut dyn ProfileStore,
    username: &str,
) -> Vec<CleanupOutcome> {
    let mut outcomes = Vec::new();

    match directory.exists(username) {
        Ok(false) => {
            outcomes.push(CleanupOutcome::Skip {
                username: username.to_string(),
            });
            return outcomes;
        }
        Ok(true) => {}
        Err(err) => {
            outcomes.push(CleanupOutcome::Error {
                username: username.to_string(),
                message: format!("{err:#}"),
            });
            return outcomes;
        }
    }

    match profiles.find(username) {
        Ok(Some(profile)) if !profile.loaded => match profiles.delete(username) {
            Ok(()) => outcomes.push(CleanupOutcome::ProfileRemoved {
                username: username.to_string(),
            }),
            Err(err) => outcomes.push(CleanupOutcome::Error {
                username: username.to_string(),
                message: format!("{err:#}"),
            }),
        },
        // ロード中のプロファイルは消さないが、アカウント削除自体は止めない（DESIGN.md 参照）。
        Ok(Some(_)) => outcomes.push(CleanupOutcome::ProfileInUse {
            username: username.to_string(),
        }),
        Ok(None) => {}
        Err(err) => outcomes.push(CleanupOutcome::Error {
            username: username.to_string(),
            message: format!("{err:#}"),
        }),
    }

    match directory.delete(username) {
        Ok(()) => outcomes.push(CleanupOutcome::AccountDeleted {
            username: username.to_string(),
        }),
        Err(err) => outcomes.push(CleanupOutcome::Error {
            username: username.to_string(),
            message: format!("{err:#}"),
        }),
    }

    outcomes
}
