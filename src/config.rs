use crate::error::{Error, Result};
use core_models::record::RecordFactory;
use core_models::{BTREE_MAX_KEY_SIZE, BTREE_MAX_VAL_SIZE, BTREE_PAGE_SIZE, HEADER, PAGE_ID_SIZE};
use serde::{Deserialize, Serialize};

/// Shape of a B+Tree: the order (maximum records per leaf, maximum children per branch) and
/// the fixed key and value widths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    pub order: usize,
    pub key_len: usize,
    pub value_len: usize,
}

impl TreeParams {
    pub fn new(order: usize, key_len: usize, value_len: usize) -> Result<Self> {
        let params = Self { order, key_len, value_len };
        params.validate()?;
        Ok(params)
    }

    /// The largest order whose full leaf and full branch pages both fit a block.
    pub fn for_block(block_size: usize, key_len: usize, value_len: usize) -> Result<Self> {
        let body = block_size.saturating_sub(HEADER);
        let leaf_order = body / (key_len + value_len).max(1);
        // A branch of order n holds n children and n-1 keys.
        let branch_order = (body + key_len) / (PAGE_ID_SIZE + key_len);
        let params = Self { order: leaf_order.min(branch_order), key_len, value_len };
        params.validate()?;
        params.check_block(block_size)?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.order < 3 {
            return Err(Error::Value(format!("Order must be at least 3, got {}", self.order)));
        }
        if self.order > u16::MAX as usize {
            return Err(Error::Value(format!("Order {} exceeds page count field", self.order)));
        }
        if self.key_len == 0 {
            return Err(Error::Value("Key length must be positive".into()));
        }
        if self.key_len > BTREE_MAX_KEY_SIZE || self.value_len > BTREE_MAX_VAL_SIZE {
            return Err(Error::Value(format!(
                "Record widths {}/{} exceed {}/{}",
                self.key_len, self.value_len, BTREE_MAX_KEY_SIZE, BTREE_MAX_VAL_SIZE
            )));
        }
        Ok(())
    }

    /// Checks that full pages of this shape fit a block of the given size.
    pub fn check_block(&self, block_size: usize) -> Result<()> {
        let leaf = HEADER + self.order * (self.key_len + self.value_len);
        let branch = HEADER + self.order * PAGE_ID_SIZE + (self.order - 1) * self.key_len;
        let needed = leaf.max(branch);
        if needed > block_size {
            return Err(Error::Value(format!(
                "Pages of order {} need {} bytes, block size is {}",
                self.order, needed, block_size
            )));
        }
        Ok(())
    }

    /// Minimum occupancy of every non-root page: ceil(order / 2).
    pub fn min_occupancy(&self) -> usize {
        (self.order + 1) / 2
    }

    pub fn record_factory(&self) -> RecordFactory {
        RecordFactory::new(self.key_len, self.value_len)
    }
}

/// Storage options shared by the file-backed components.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Block size of B+Tree page files.
    pub block_size: usize,
    /// Whether commit-prepare syncs data as well as flushing it.
    pub sync_on_prepare: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { block_size: BTREE_PAGE_SIZE, sync_on_prepare: true }
    }
}
