//! 인덱스 쓰기 잠금
//!
//! `<persist_dir>/<collection>.lock` 파일에 OS 권고 잠금(flock / LockFileEx)을
//! 걸어 한 번에 하나의 빌드만 컬렉션을 쓰도록 합니다. 잠금은 파일 핸들에
//! 묶여 있으므로 Drop 시, 또는 프로세스가 비정상 종료되면 커널이 해제합니다.
//! 잠금 파일 자체는 남겨두며 다음 빌드가 그대로 재사용합니다.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{RagError, Result};

/// 권고 잠금 핸들
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
    file: File,
}

impl IndexLock {
    /// 잠금 획득
    ///
    /// # Errors
    /// * `IndexLocked` - 살아 있는 다른 빌드가 잠금을 가지고 있음
    pub fn acquire(persist_dir: &Path, collection: &str) -> Result<Self> {
        let path = lock_path(persist_dir, collection);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| RagError::io(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            return Err(
                if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    RagError::IndexLocked(path)
                } else {
                    RagError::io(&path, e)
                },
            );
        }

        // 소유자 pid 기록 (디버깅용, 실패해도 잠금은 유효)
        let owner = file
            .set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{}", std::process::id()));
        if let Err(e) = owner {
            tracing::debug!("Failed to record lock owner in {:?}: {}", path, e);
        }

        tracing::debug!("Acquired index lock {:?}", path);
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release index lock {:?}: {}", self.path, e);
        }
    }
}

/// 컬렉션 잠금 파일 경로
pub fn lock_path(persist_dir: &Path, collection: &str) -> PathBuf {
    persist_dir.join(format!("{}.lock", collection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let dir = TempDir::new().unwrap();

        let lock = IndexLock::acquire(dir.path(), "docs").unwrap();
        assert!(lock.path().exists());

        let second = IndexLock::acquire(dir.path(), "docs");
        assert!(matches!(second, Err(RagError::IndexLocked(_))));

        // 다른 컬렉션은 독립
        let other = IndexLock::acquire(dir.path(), "other").unwrap();
        drop(other);

        drop(lock);
        assert!(IndexLock::acquire(dir.path(), "docs").is_ok());
    }

    #[test]
    fn test_leftover_lock_file_does_not_block() {
        let dir = TempDir::new().unwrap();

        // 강제 종료된 빌드가 남긴 잠금 파일
        std::fs::write(lock_path(dir.path(), "docs"), "999999\n").unwrap();

        let lock = IndexLock::acquire(dir.path(), "docs").unwrap();
        let owner = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
    }
}
