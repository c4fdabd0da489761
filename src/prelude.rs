pub use crate::*;
pub use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub use std::io::{Read, Seek, SeekFrom, Write};
pub use tracing::{debug, info, trace, warn};
