use ahash::AHashMap;
use std::error::Error;
use std::fmt;

/// Words per sector.
pub const WORDS_PER_SECTOR: usize = 512;
/// Sectors per track; seek delay is charged per track traversed.
pub const SECTORS_PER_TRACK: u16 = 18;
/// Tracks per disk.
pub const TRACKS_PER_DISK: u16 = 80;
/// Total sectors on a disk.
pub const SECTORS_PER_DISK: u16 = SECTORS_PER_TRACK * TRACKS_PER_DISK;
/// Total words on a disk.
pub const WORDS_PER_DISK: usize = WORDS_PER_SECTOR * SECTORS_PER_DISK as usize;

/// One 512-word sector buffer.
pub type Sector = [u16; WORDS_PER_SECTOR];

/// Errors from constructing or addressing a medium. These mean the calling
/// layer is buggy or was handed bad data; they are never visible to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumError {
    /// Sector index past the end of the disk.
    InvalidSector(u16),
    /// Image with more words than the disk can hold.
    OversizedImage(usize),
    /// Byte image with an odd length; words are 16-bit big-endian.
    UnevenImage(usize),
}

impl fmt::Display for MediumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MediumError::InvalidSector(sector) => {
                write!(f, "Bad sector number: {}.", sector)
            }
            MediumError::OversizedImage(words) => {
                write!(
                    f,
                    "Disk image of {} words exceeds the disk capacity of {} words.",
                    words, WORDS_PER_DISK
                )
            }
            MediumError::UnevenImage(bytes) => {
                write!(
                    f,
                    "Disk image of {} bytes is not a whole number of words.",
                    bytes
                )
            }
        }
    }
}

impl Error for MediumError {}

/// Result type alias.
pub type MediumResult<T> = Result<T, MediumError>;

/// A removable floppy medium: a sparse, sector-addressable word store with
/// a human-readable label and a write-protect flag.
pub struct Medium {
    label: String,
    write_protected: bool,
    /// `ahash` is faster than the standard hasher, and cryptographic
    /// security doesn't matter here.
    sectors: AHashMap<u16, Box<Sector>>,
}

impl fmt::Debug for Medium {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Medium")
            .field("label", &self.label)
            .field("write_protected", &self.write_protected)
            .field("allocated_sectors", &self.sectors.len())
            .finish()
    }
}

impl Medium {
    /// Create a blank medium. No sectors are allocated until touched.
    pub fn blank(label: impl Into<String>) -> Self {
        Medium {
            label: label.into(),
            write_protected: false,
            sectors: AHashMap::new(),
        }
    }

    /// Create a medium from a word image, split into consecutive sectors.
    /// The last partial sector is zero-padded.
    pub fn from_image(label: impl Into<String>, image: &[u16]) -> MediumResult<Self> {
        if image.len() > WORDS_PER_DISK {
            return Err(MediumError::OversizedImage(image.len()));
        }
        let mut medium = Medium::blank(label);
        for (index, chunk) in image.chunks(WORDS_PER_SECTOR).enumerate() {
            let mut sector = Box::new([0; WORDS_PER_SECTOR]);
            sector[..chunk.len()].copy_from_slice(chunk);
            medium.sectors.insert(index as u16, sector);
        }
        Ok(medium)
    }

    /// Create a medium from a raw big-endian byte stream.
    pub fn from_bytes(label: impl Into<String>, bytes: &[u8]) -> MediumResult<Self> {
        if bytes.len() % 2 != 0 {
            return Err(MediumError::UnevenImage(bytes.len()));
        }
        let words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        Medium::from_image(label, &words)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Borrow the given sector, materialising a zero-filled buffer on first
    /// access.
    pub fn sector_mut(&mut self, sector: u16) -> MediumResult<&mut Sector> {
        if sector >= SECTORS_PER_DISK {
            return Err(MediumError::InvalidSector(sector));
        }
        Ok(self
            .sectors
            .entry(sector)
            .or_insert_with(|| Box::new([0; WORDS_PER_SECTOR])))
    }

    /// Whether the given sector is unreadable. Always false once the index
    /// is range-checked; real fault injection can slot in here later.
    pub fn is_bad_sector(&self, sector: u16) -> MediumResult<bool> {
        if sector >= SECTORS_PER_DISK {
            return Err(MediumError::InvalidSector(sector));
        }
        Ok(false)
    }

    /// Number of sectors actually backed by storage.
    pub fn allocated_sectors(&self) -> usize {
        self.sectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_medium_is_lazy() {
        let mut medium = Medium::blank("scratch");
        assert_eq!(medium.allocated_sectors(), 0);

        // Touching a sector materialises exactly that sector, zero-filled.
        let sector = medium.sector_mut(1439).unwrap();
        assert!(sector.iter().all(|&word| word == 0));
        assert_eq!(medium.allocated_sectors(), 1);
    }

    #[test]
    fn test_sector_range() {
        let mut medium = Medium::blank("scratch");
        assert!(medium.sector_mut(0).is_ok());
        assert!(medium.sector_mut(SECTORS_PER_DISK - 1).is_ok());
        assert_eq!(
            medium.sector_mut(SECTORS_PER_DISK).unwrap_err(),
            MediumError::InvalidSector(SECTORS_PER_DISK)
        );
        assert_eq!(
            medium.sector_mut(u16::MAX).unwrap_err(),
            MediumError::InvalidSector(u16::MAX)
        );
    }

    #[test]
    fn test_no_bad_sectors_in_range() {
        let medium = Medium::blank("scratch");
        for sector in [0, 1, 717, SECTORS_PER_DISK - 1] {
            assert_eq!(medium.is_bad_sector(sector), Ok(false));
        }
        assert_eq!(
            medium.is_bad_sector(SECTORS_PER_DISK),
            Err(MediumError::InvalidSector(SECTORS_PER_DISK))
        );
    }

    #[test]
    fn test_from_image_pads_last_sector() {
        // A sector and a half: the second sector gets zero-padded.
        let image = vec![0xBEEF; WORDS_PER_SECTOR + WORDS_PER_SECTOR / 2];
        let mut medium = Medium::from_image("image", &image).unwrap();
        assert_eq!(medium.allocated_sectors(), 2);

        assert!(medium.sector_mut(0).unwrap().iter().all(|&w| w == 0xBEEF));
        let second = medium.sector_mut(1).unwrap();
        assert!(second[..WORDS_PER_SECTOR / 2].iter().all(|&w| w == 0xBEEF));
        assert!(second[WORDS_PER_SECTOR / 2..].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_from_image_capacity() {
        let full = vec![0; WORDS_PER_DISK];
        assert_eq!(
            Medium::from_image("full", &full).unwrap().allocated_sectors(),
            SECTORS_PER_DISK as usize
        );

        let oversized = vec![0; WORDS_PER_DISK + 1];
        assert_eq!(
            Medium::from_image("too big", &oversized).unwrap_err(),
            MediumError::OversizedImage(WORDS_PER_DISK + 1)
        );
    }

    #[test]
    fn test_from_empty_image() {
        let mut medium = Medium::from_image("empty", &[]).unwrap();
        assert_eq!(medium.allocated_sectors(), 0);
        // Every in-range sector still reads as zeros.
        assert!(medium.sector_mut(42).unwrap().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_from_bytes_is_big_endian() {
        let mut medium = Medium::from_bytes("boot", &[0x12, 0x34, 0xAB, 0xCD]).unwrap();
        let sector = medium.sector_mut(0).unwrap();
        assert_eq!(sector[0], 0x1234);
        assert_eq!(sector[1], 0xABCD);
        assert_eq!(sector[2], 0);
    }

    #[test]
    fn test_from_bytes_rejects_odd_length() {
        assert_eq!(
            Medium::from_bytes("torn", &[0x12, 0x34, 0xAB]).unwrap_err(),
            MediumError::UnevenImage(3)
        );
    }

    #[test]
    fn test_label_and_write_protect() {
        let mut medium = Medium::blank("first");
        assert_eq!(medium.label(), "first");
        assert!(!medium.is_write_protected());

        medium.set_label("second");
        medium.set_write_protected(true);
        assert_eq!(medium.label(), "second");
        assert!(medium.is_write_protected());
    }
}
