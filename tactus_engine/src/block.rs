use tactus_shared::Ppqn;

/// Bitset describing a sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u8);

impl BlockFlags {
    pub const NONE: BlockFlags = BlockFlags(0);
    pub const TRANSPORTING: BlockFlags = BlockFlags(1 << 0);
    pub const DISCONTINUOUS: BlockFlags = BlockFlags(1 << 1);
    pub const PLAYING: BlockFlags = BlockFlags(1 << 2);
    pub const TEMPO_CHANGED: BlockFlags = BlockFlags(1 << 3);

    pub fn create(transporting: bool, discontinuous: bool, playing: bool, tempo_changed: bool) -> Self {
        let mut flags = BlockFlags::NONE;
        flags.set(BlockFlags::TRANSPORTING, transporting);
        flags.set(BlockFlags::DISCONTINUOUS, discontinuous);
        flags.set(BlockFlags::PLAYING, playing);
        flags.set(BlockFlags::TEMPO_CHANGED, tempo_changed);
        flags
    }

    /// True if every bit of `other` is set.
    pub fn contains(self, other: BlockFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: BlockFlags, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    pub fn transporting(self) -> bool {
        self.contains(BlockFlags::TRANSPORTING)
    }

    pub fn discontinuous(self) -> bool {
        self.contains(BlockFlags::DISCONTINUOUS)
    }

    pub fn playing(self) -> bool {
        self.contains(BlockFlags::PLAYING)
    }

    pub fn tempo_changed(self) -> bool {
        self.contains(BlockFlags::TEMPO_CHANGED)
    }
}

impl std::ops::BitOr for BlockFlags {
    type Output = BlockFlags;

    fn bitor(self, rhs: BlockFlags) -> BlockFlags {
        BlockFlags(self.0 | rhs.0)
    }
}

/// A contiguous slice of one render quantum at a single tempo.
///
/// `[p0, p1)` is the musical range, `[s0, s1)` the matching sample range
/// within the quantum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub index: usize,
    pub p0: Ppqn,
    pub p1: Ppqn,
    pub s0: usize,
    pub s1: usize,
    pub bpm: f64,
    pub flags: BlockFlags,
}

/// The sub-blocks of one render callback, in time order.
#[derive(Debug, Default)]
pub struct ProcessInfo {
    pub blocks: Vec<Block>,
}

impl ProcessInfo {
    pub fn new() -> Self {
        Self { blocks: Vec::with_capacity(16) }
    }
}

/// Notified to interested components around every render callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessPhase {
    Before,
    After,
}
