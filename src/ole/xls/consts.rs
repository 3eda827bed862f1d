//! BIFF record identifiers and decoder constants.
//!
//! Several records changed id between BIFF versions; the suffix names the
//! first version using that id.

pub const BOF_BIFF2: u16 = 0x0009;
pub const BOF_BIFF3: u16 = 0x0209;
pub const BOF_BIFF4: u16 = 0x0409;
pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;

pub const FILEPASS: u16 = 0x002F;
pub const INTERFACEHDR: u16 = 0x00E1;
pub const CODEPAGE: u16 = 0x0042;
pub const DATE1904: u16 = 0x0022;
pub const BOUNDSHEET: u16 = 0x0085;
pub const CODENAME: u16 = 0x01BA;

pub const FORMAT_BIFF2: u16 = 0x001E;
pub const FORMAT: u16 = 0x041E;
pub const XF_BIFF2: u16 = 0x0043;
pub const XF_BIFF3: u16 = 0x0243;
pub const XF_BIFF4: u16 = 0x0443;
pub const XF: u16 = 0x00E0;
pub const FONT: u16 = 0x0031;
pub const FONT_BIFF3: u16 = 0x0231;

pub const SST: u16 = 0x00FC;
pub const CONTINUE: u16 = 0x003C;

pub const DIMENSIONS_BIFF2: u16 = 0x0000;
pub const DIMENSIONS: u16 = 0x0200;
pub const INDEX_BIFF2: u16 = 0x000B;
pub const INDEX: u16 = 0x020B;
pub const DBCELL: u16 = 0x00D7;
pub const ROW_BIFF2: u16 = 0x0008;
pub const ROW: u16 = 0x0208;
pub const DEFAULTROWHEIGHT_BIFF2: u16 = 0x0025;
pub const DEFAULTROWHEIGHT: u16 = 0x0225;
pub const COLINFO: u16 = 0x007D;
pub const MERGECELLS: u16 = 0x00E5;
pub const HEADER: u16 = 0x0014;
pub const FOOTER: u16 = 0x0015;

pub const BLANK_BIFF2: u16 = 0x0001;
pub const BLANK: u16 = 0x0201;
pub const INTEGER_BIFF2: u16 = 0x0002;
pub const NUMBER_BIFF2: u16 = 0x0003;
pub const NUMBER: u16 = 0x0203;
pub const LABEL_BIFF2: u16 = 0x0004;
pub const LABEL: u16 = 0x0204;
pub const BOOLERR_BIFF2: u16 = 0x0005;
pub const BOOLERR: u16 = 0x0205;
pub const RSTRING: u16 = 0x00D6;
pub const LABELSST: u16 = 0x00FD;
pub const RK: u16 = 0x027E;
pub const MULRK: u16 = 0x00BD;
pub const MULBLANK: u16 = 0x00BE;

/// BIFF2 and BIFF5/8 share this id
pub const FORMULA: u16 = 0x0006;
pub const FORMULA_BIFF3: u16 = 0x0206;
pub const FORMULA_BIFF4: u16 = 0x0406;
pub const STRING_BIFF2: u16 = 0x0007;
pub const STRING: u16 = 0x0207;
pub const SHAREDFMLA: u16 = 0x04BC;
pub const ARRAY_BIFF2: u16 = 0x0021;
pub const ARRAY: u16 = 0x0221;
pub const TABLE: u16 = 0x0236;

/// Size of a record header (id + payload length)
pub const RECORD_HEADER_SIZE: usize = 4;

/// RC4 streams are rekeyed every 1024 bytes of the workbook stream
pub const RC4_BLOCK_SIZE: usize = 1024;

/// Password Excel uses for workbooks that are only write-protected
pub const DEFAULT_PASSWORD: &str = "VelvetSweatshop";

/// Rows decoded per seek by the row block reader
pub const ROWS_PER_BLOCK: u32 = 32;

/// Default row height in twips when the sheet declares none
pub const DEFAULT_ROW_HEIGHT_TWIPS: u16 = 255;
