// Copyright (c) 2026 Emberchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Append-only file persistence.
//!
//! On-disk format: each block's compact JSON followed by `",\n"`. Load
//! splits on the separator and drops empty trailing segments. Compact JSON
//! never contains a raw newline, so the separator is unambiguous.

use crate::core::types::Block;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Separator between persisted blocks.
pub const BLOCK_SEPARATOR: &str = ",\n";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing file absent or holds no blocks; the genesis-creation signal.
    #[error("no persisted chain")]
    Empty,
    #[error("io")]
    Io,
    #[error("parse")]
    Parse,
    #[error("codec")]
    Codec,
    #[error("lock poisoned")]
    Lock,
}

/// Pluggable chain persistence.
pub trait Storage: Send + Sync {
    /// Atomically append one block to the stream.
    fn append_block(&self, block: &Block) -> Result<(), StorageError>;
    /// Load the full persisted chain. `Err(Empty)` signals genesis creation.
    fn load_chain(&self) -> Result<Vec<Block>, StorageError>;
    /// Atomically replace the whole stream (peer-chain acceptance).
    fn rewrite_chain(&self, chain: &[Block]) -> Result<(), StorageError>;
    /// Pretty JSON dump of the persisted chain.
    fn export(&self) -> Result<String, StorageError>;
}

/// File-backed [`Storage`] variant.
pub struct FileStorage {
    path: PathBuf,
    /// Serializes this store's own I/O.
    io: Mutex<()>,
}

impl FileStorage {
    /// Storage backed by the file at `path` (created on first append).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    fn load_unlocked(&self) -> Result<Vec<Block>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::Empty),
            Err(_) => return Err(StorageError::Io),
        };

        let mut chain = Vec::new();
        for segment in raw.split(BLOCK_SEPARATOR) {
            if segment.trim().is_empty() {
                continue;
            }
            let block: Block = serde_json::from_str(segment).map_err(|_| StorageError::Parse)?;
            chain.push(block);
        }
        if chain.is_empty() {
            return Err(StorageError::Empty);
        }
        Ok(chain)
    }

    fn render(chain: &[Block]) -> Result<String, StorageError> {
        let mut out = String::new();
        for block in chain {
            let json = serde_json::to_string(block).map_err(|_| StorageError::Codec)?;
            out.push_str(&json);
            out.push_str(BLOCK_SEPARATOR);
        }
        Ok(out)
    }
}

impl Storage for FileStorage {
    fn append_block(&self, block: &Block) -> Result<(), StorageError> {
        let _guard = self.io.lock().map_err(|_| StorageError::Lock)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|_| StorageError::Io)?;
            }
        }
        let json = serde_json::to_string(block).map_err(|_| StorageError::Codec)?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|_| StorageError::Io)?;
        f.write_all(json.as_bytes()).map_err(|_| StorageError::Io)?;
        f.write_all(BLOCK_SEPARATOR.as_bytes())
            .map_err(|_| StorageError::Io)?;
        let _ = f.sync_all();
        Ok(())
    }

    fn load_chain(&self) -> Result<Vec<Block>, StorageError> {
        let _guard = self.io.lock().map_err(|_| StorageError::Lock)?;
        self.load_unlocked()
    }

    fn rewrite_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        let _guard = self.io.lock().map_err(|_| StorageError::Lock)?;

        let rendered = Self::render(chain)?;
        // Tmp-then-rename so a crash mid-rewrite cannot truncate the chain.
        let mut tmp = self.path.clone();
        tmp.set_extension("tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|_| StorageError::Io)?;
            }
        }
        {
            let mut f = fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&tmp)
                .map_err(|_| StorageError::Io)?;
            f.write_all(rendered.as_bytes())
                .map_err(|_| StorageError::Io)?;
            let _ = f.sync_all();
        }
        fs::rename(&tmp, &self.path).map_err(|_| StorageError::Io)
    }

    fn export(&self) -> Result<String, StorageError> {
        let _guard = self.io.lock().map_err(|_| StorageError::Lock)?;
        let chain = self.load_unlocked()?;
        serde_json::to_string_pretty(&chain).map_err(|_| StorageError::Codec)
    }
}
