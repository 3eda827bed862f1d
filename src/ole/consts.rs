/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 512;

/// Number of FAT sector ids stored inline in the header
pub const HEADER_DIFAT_ENTRIES: usize = 109;

/// Offset of the first inline DIFAT entry in the header
pub const HEADER_DIFAT_OFFSET: usize = 0x4C;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Standard little-endian byte order marker
pub const BYTE_ORDER_LE: u16 = 0xFFFE;

/// Byte-swapped marker written by some third-party producers
pub const BYTE_ORDER_BROKEN: u16 = 0xFEFF;

/// Sector shift for version 3 files (512-byte sectors)
pub const SECTOR_SHIFT_V3: u16 = 9;

/// Sector shift for version 4 files (4096-byte sectors)
pub const SECTOR_SHIFT_V4: u16 = 12;

/// Default mini stream cutoff
pub const DEFAULT_MINI_CUTOFF: u32 = 4096;

// Sector IDs
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes a DIFAT sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

/// Absent sibling/child link in a directory entry
pub const NOSTREAM: u32 = 0xFFFFFFFF;

// Object types in storage
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is an ILockBytes object
pub const STGTY_LOCKBYTES: u8 = 3;
/// Element is an IPropertyStorage object
pub const STGTY_PROPERTY: u8 = 4;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;
