use super::session::{Emulator, PhysicalPage};

pub const BANK_SIZE: u16 = 0x4000;

/// Addresses at or above this are RAM on every supported model.
pub const RAM_START: u16 = 0x8000;

pub fn bank_of(address: u16) -> usize {
    (address >> 14) as usize
}

pub fn is_ram_address(address: u16) -> bool {
    address >= RAM_START
}

/// Converts between the live bank mapping and the page numbers the listing
/// table uses. Results depend on the current mapping; never keep them across
/// a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTranslator {
    is_app: bool,
    app_page: u8,
}

impl PageTranslator {
    pub fn new(is_app: bool, app_page: u8) -> Self {
        Self { is_app, app_page }
    }

    pub fn is_app(&self) -> bool {
        self.is_app
    }

    pub fn app_page(&self) -> u8 {
        self.app_page
    }

    pub fn set_app_page(&mut self, page: u8) {
        self.app_page = page;
    }

    pub fn relative_page<E: Emulator + ?Sized>(&self, emulator: &E, address: u16) -> u8 {
        self.relative(emulator.bank(bank_of(address)))
    }

    pub fn absolute_page<E: Emulator + ?Sized>(&self, emulator: &E, address: u16) -> u8 {
        emulator.bank(bank_of(address)).index
    }

    /// App sessions number their Flash pages downward from the app's first page.
    pub fn relative(&self, page: PhysicalPage) -> u8 {
        if self.is_app && page.is_flash() {
            self.app_page.wrapping_sub(page.index)
        } else {
            page.index
        }
    }

    /// Inverse of [`relative`](Self::relative) for a listing-table page.
    pub fn absolute(&self, page: u8, is_ram: bool) -> u8 {
        if self.is_app && !is_ram {
            self.app_page.wrapping_sub(page)
        } else {
            page
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_pages_count_down_from_the_app_page() {
        let paging = PageTranslator::new(true, 0x69);
        assert_eq!(paging.relative(PhysicalPage::flash(0x69)), 0);
        assert_eq!(paging.relative(PhysicalPage::flash(0x68)), 1);
        assert_eq!(paging.relative(PhysicalPage::ram(1)), 1);
        assert_eq!(paging.absolute(1, false), 0x68);
        assert_eq!(paging.absolute(1, true), 1);
    }

    #[test]
    fn programs_use_raw_page_numbers() {
        let paging = PageTranslator::new(false, 0x69);
        assert_eq!(paging.relative(PhysicalPage::flash(0x1B)), 0x1B);
        assert_eq!(paging.absolute(0x1B, false), 0x1B);
    }

    #[test]
    fn banks_are_16k_windows() {
        assert_eq!(bank_of(0x0000), 0);
        assert_eq!(bank_of(0x3FFF), 0);
        assert_eq!(bank_of(0x4000), 1);
        assert_eq!(bank_of(0x9D95), 2);
        assert_eq!(bank_of(0xFFFF), 3);
        assert!(is_ram_address(0x8000));
        assert!(!is_ram_address(0x7FFF));
    }
}
