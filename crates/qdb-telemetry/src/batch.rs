//! Opaque batch record seam for the transaction timeline.
//!
//! The timeline tracker needs a sequence number and the ordered
//! (command, key, value) triples of a batched client request, but must not
//! depend on the concrete wire message type. `BatchRecord` abstracts that
//! view so the host's decoded batch type can plug in directly and tests can
//! use `OwnedBatch`.

/// Read-only view of a batched client request.
///
/// The three sequences are index-aligned: `commands()[i]` operates on
/// `keys()[i]` with `values()[i]`. Implementations are expected to keep them
/// the same length; the tracker tolerates mismatches by capturing only the
/// common prefix.
pub trait BatchRecord {
    /// The batch's sequence number in the agreement log.
    fn seq(&self) -> u64;

    /// One command name per operation in the batch.
    fn commands(&self) -> &[String];

    /// One key per operation in the batch.
    fn keys(&self) -> &[String];

    /// One value per operation in the batch.
    fn values(&self) -> &[String];
}

/// Plain owned batch, for hosts that already hold decoded fields and for
/// tests.
#[derive(Debug, Clone, Default)]
pub struct OwnedBatch {
    pub seq: u64,
    pub commands: Vec<String>,
    pub keys: Vec<String>,
    pub values: Vec<String>,
}

impl OwnedBatch {
    /// Build a batch from parallel operation lists.
    pub fn new(seq: u64, commands: Vec<String>, keys: Vec<String>, values: Vec<String>) -> Self {
        Self {
            seq,
            commands,
            keys,
            values,
        }
    }
}

impl BatchRecord for OwnedBatch {
    fn seq(&self) -> u64 {
        self.seq
    }

    fn commands(&self) -> &[String] {
        &self.commands
    }

    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn values(&self) -> &[String] {
        &self.values
    }
}
