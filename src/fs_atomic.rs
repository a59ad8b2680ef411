//! 原子文件写入
//!
//! `write_atomic`：临时文件写完并 fsync 后 rename 覆盖目标，读者只会看到旧内容或新内容。
//! `write_new`：临时文件写完后硬链接到目标，目标已存在则失败（返回 false），用于只写一次的文件
//! 和修订日志的提交。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

fn temp_sibling(path: &Path) -> std::io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    let name = path.file_name().and_then(|v| v.to_str()).unwrap_or("state");
    Ok(parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4().simple())))
}

async fn write_temp(path: &Path, content: &[u8]) -> std::io::Result<PathBuf> {
    let tmp = temp_sibling(path)?;
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp)
        .await?;
    if let Err(e) = async {
        file.write_all(content).await?;
        file.sync_all().await
    }
    .await
    {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(tmp)
}

pub async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp = write_temp(path, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// 仅当目标不存在时创建；已存在返回 Ok(false)，内容保持不变
pub async fn write_new(path: &Path, content: &[u8]) -> std::io::Result<bool> {
    let tmp = write_temp(path, content).await?;
    let linked = fs::hard_link(&tmp, path).await;
    let _ = fs::remove_file(&tmp).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}
