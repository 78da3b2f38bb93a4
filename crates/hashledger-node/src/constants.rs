pub(crate) const DEFAULT_TAIL: usize = 10;
pub(crate) const MAX_TAIL_BLOCKS: usize = DEFAULT_TAIL * 25;
