// Raw codes carried in the integer field of a reply, matching the values
// written to outcome files.
pub const PAGE_FAULT: i32 = -1;
pub const INVALID_PAGE: i32 = -2;
pub const END_OF_REF: i32 = -9;

pub const DEFAULT_REF_LEN: usize = 16;
pub const DEFAULT_ILLEGAL_RATE: f64 = 0.0;
