//! Named pre-rendered buffers, frozen into an immutable bank per session.

use std::collections::HashMap;
use std::sync::Arc;

use sa_ir::{BufferBank, BufferKey, PcmBuffer};

use crate::error::MasterError;

/// Collects buffers before a session starts. Once frozen, the bank is
/// shared read-only with the engine and cannot change.
#[derive(Debug, Default)]
pub struct AssetLibrary {
    bank: BufferBank,
    names: HashMap<String, BufferKey>,
    frozen: Option<Arc<BufferBank>>,
}

impl AssetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, buffer: PcmBuffer) -> Result<BufferKey, MasterError> {
        if self.frozen.is_some() {
            return Err(MasterError::AssetsFrozen);
        }
        Ok(self.bank.insert(buffer))
    }

    pub fn insert_named(&mut self, name: &str, buffer: PcmBuffer) -> Result<BufferKey, MasterError> {
        if self.names.contains_key(name) {
            return Err(MasterError::DuplicateAsset(name.to_string()));
        }
        let key = self.insert(buffer)?;
        self.names.insert(name.to_string(), key);
        Ok(key)
    }

    pub fn get(&self, key: BufferKey) -> Option<&PcmBuffer> {
        match &self.frozen {
            Some(bank) => bank.get(key),
            None => self.bank.get(key),
        }
    }

    pub fn key_for(&self, name: &str) -> Result<BufferKey, MasterError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| MasterError::UnknownAsset(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.frozen.as_ref().map_or(self.bank.len(), |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Seal the library and return the shared bank. Repeated calls return
    /// the same bank.
    pub fn freeze(&mut self) -> Arc<BufferBank> {
        let bank = &mut self.bank;
        Arc::clone(
            self.frozen
                .get_or_insert_with(|| Arc::new(std::mem::take(bank))),
        )
    }
}
