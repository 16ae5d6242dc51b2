use std::fmt::Display;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HCError
{
    AllocationFailed,
    BlockSpansPes,
    InvalidDimension,
    InvalidConfig,
    OutOfDomain,
    InvalidIndex,
    TooManyBoundaryConditions,
    CapacityExceeded,
    NotSubdividable,
    NotCoarsenable,
    SerializationFailed,
    DeserializationFailed,
    LZ4DecompressionFailed,
    SnapshotMismatch,
    FileIOError,
    ReadBufferFailed,
    WriteBufferFailed,
}
impl std::error::Error for HCError {}

impl Display for HCError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", *self)
    }
}
