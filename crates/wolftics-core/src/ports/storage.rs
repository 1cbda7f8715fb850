//! Storage port - 永続化の抽象化（key → string）
//!
//! ブラウザの localStorage に相当する、ベストエフォートの永続化面です。
//!
//! # 設計原則
//! - 失敗は呼び出し側で握りつぶす（致命的にしない）
//! - 永続化できない場合、キューはメモリのみで動作を続ける

use crate::domain::errors::StorageError;

/// Storage は key → string の永続化を提供
///
/// 実装は内部可変性を持つ（`&self` で書き込む）。キューと identity が
/// 同じ Storage を共有するため。
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
