mod client_info_extractor;

pub use client_info_extractor::*;
