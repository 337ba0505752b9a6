//! Chip Profiles
//!
//! Bus addresses, identifier registers and the static per-chip defaults
//! applied when a driver is bound.

use crate::types::{CfaPattern, HardwareFlags, Polarity, YuvOrder};

// Slave addresses
pub const OV2640_SLV_ADDR: u8 = 0x60;
pub const OV5640_SLV_ADDR: u8 = 0x78;
pub const OV7725_SLV_ADDR: u8 = 0x42;
pub const MT9V0XX_SLV_ADDR: u8 = 0xB8;
pub const MT9M114_SLV_ADDR: u8 = 0x90;
pub const LEPTON_SLV_ADDR: u8 = 0x54;
pub const HM0XX0_SLV_ADDR: u8 = 0x48;
pub const GC2145_SLV_ADDR: u8 = 0x78;
pub const GENX320_SLV_ADDR: u8 = 0x78;
pub const FROGEYE2020_SLV_ADDR: u8 = 0x6E;
pub const PAG7920_SLV_ADDR: u8 = 0x80;
pub const PAG7936_SLV_ADDR: u8 = 0x80;

/// Addresses scanned during detection, in probe order
pub const KNOWN_ADDRESSES: [u8; 9] = [
    OV2640_SLV_ADDR,
    OV5640_SLV_ADDR,
    OV7725_SLV_ADDR,
    MT9V0XX_SLV_ADDR,
    MT9M114_SLV_ADDR,
    LEPTON_SLV_ADDR,
    HM0XX0_SLV_ADDR,
    FROGEYE2020_SLV_ADDR,
    PAG7920_SLV_ADDR,
];

// Chip id registers
pub const OV5640_CHIP_ID: u16 = 0x300A;
pub const OV_CHIP_ID: u16 = 0x0A;
pub const ON_CHIP_ID: u16 = 0x00;
pub const HIMAX_CHIP_ID: u16 = 0x0001;
pub const GC_CHIP_ID: u16 = 0xF0;
pub const GENX320_CHIP_ID: u16 = 0x0014;
pub const PIXART_CHIP_ID: u16 = 0x0000;

// Chip id values
pub const OV2640_ID: u32 = 0x26;
pub const OV5640_ID: u32 = 0x56;
pub const OV7670_ID: u32 = 0x76;
pub const OV7690_ID: u32 = 0x76;
pub const OV7725_ID: u32 = 0x77;
pub const OV9650_ID: u32 = 0x96;
pub const MT9V0X2_ID_V_1: u32 = 0x1311;
pub const MT9V0X2_ID_V_2: u32 = 0x1312;
pub const MT9V0X2_ID: u32 = 0x1313;
pub const MT9V0X2_C_ID: u32 = 0x1413;
pub const MT9V0X4_ID: u32 = 0x1324;
pub const MT9V0X4_C_ID: u32 = 0x1424;
pub const MT9M114_ID: u32 = 0x2481;
pub const LEPTON_ID: u32 = 0x54;
pub const LEPTON_1_5: u32 = 0x5415;
pub const LEPTON_1_6: u32 = 0x5416;
pub const LEPTON_2_0: u32 = 0x5420;
pub const LEPTON_2_5: u32 = 0x5425;
pub const LEPTON_3_0: u32 = 0x5430;
pub const LEPTON_3_5: u32 = 0x5435;
pub const HM01B0_ID: u32 = 0xB0;
pub const HM0360_ID: u32 = 0x60;
pub const GC2145_ID: u32 = 0x21;
pub const GENX320_ID_ES: u32 = 0x3050_1C01;
pub const GENX320_ID_MP: u32 = 0xB060_2003;
pub const PAG7920_ID: u32 = 0x7920;
pub const PAG7936_ID: u32 = 0x7936;
pub const PAJ6100_ID: u32 = 0x6100;
pub const FROGEYE2020_ID: u32 = 0x2020;

/// How the chip identifier is obtained at a given address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdProbe {
    /// One 8-bit register
    Byte(u16),
    /// One 16-bit register
    Word(u16),
    /// Two 16-bit registers at `reg` (high half) and `reg + 2` (low half)
    Long(u16),
    /// The part cannot be interrogated over the bus; the address implies the family
    Fixed(u32),
}

/// Identifier probes for a responding address, tried in order
pub fn id_probes(slv_addr: u8) -> &'static [IdProbe] {
    match slv_addr {
        OV2640_SLV_ADDR | OV7725_SLV_ADDR => &[IdProbe::Byte(OV_CHIP_ID)],
        // Shared by OV5640, GC2145 and GENX320
        OV5640_SLV_ADDR => &[
            IdProbe::Byte(OV5640_CHIP_ID),
            IdProbe::Byte(GC_CHIP_ID),
            IdProbe::Long(GENX320_CHIP_ID),
        ],
        MT9V0XX_SLV_ADDR => &[IdProbe::Word(ON_CHIP_ID)],
        MT9M114_SLV_ADDR => &[IdProbe::Word(ON_CHIP_ID)],
        LEPTON_SLV_ADDR => &[IdProbe::Fixed(LEPTON_ID)],
        HM0XX0_SLV_ADDR => &[IdProbe::Byte(HIMAX_CHIP_ID)],
        FROGEYE2020_SLV_ADDR => &[IdProbe::Fixed(FROGEYE2020_ID)],
        PAG7920_SLV_ADDR => &[IdProbe::Word(PIXART_CHIP_ID)],
        _ => &[],
    }
}

/// Static defaults of one chip family
#[derive(Debug, Clone, Copy)]
pub struct ChipProfile {
    pub name: &'static str,
    /// Identifiers this profile answers to
    pub chip_ids: &'static [u32],
    pub slv_addr: u8,
    /// Sensor master clock
    pub xclk_hz: u32,
    pub flags: HardwareFlags,
}

const OMNIVISION_FLAGS: HardwareFlags = HardwareFlags {
    vsync_pol: Polarity::ActiveHigh,
    hsync_pol: Polarity::ActiveLow,
    pixck_pol: Polarity::ActiveHigh,
    mono_bpp: 2,
    rgb_swap: true,
    ..HardwareFlags::DEFAULT
};

/// Known chip families
pub static PROFILES: &[ChipProfile] = &[
    ChipProfile {
        name: "OV2640",
        chip_ids: &[OV2640_ID],
        slv_addr: OV2640_SLV_ADDR,
        xclk_hz: 12_000_000,
        flags: HardwareFlags {
            jpg_mode: Some(4),
            ..OMNIVISION_FLAGS
        },
    },
    ChipProfile {
        name: "OV5640",
        chip_ids: &[OV5640_ID],
        slv_addr: OV5640_SLV_ADDR,
        xclk_hz: 24_000_000,
        flags: HardwareFlags {
            jpg_mode: Some(4),
            rgb_swap: false,
            ..OMNIVISION_FLAGS
        },
    },
    ChipProfile {
        name: "OV7670/OV7690",
        chip_ids: &[OV7670_ID, OV7690_ID],
        slv_addr: OV7725_SLV_ADDR,
        xclk_hz: 12_000_000,
        flags: OMNIVISION_FLAGS,
    },
    ChipProfile {
        name: "OV7725",
        chip_ids: &[OV7725_ID],
        slv_addr: OV7725_SLV_ADDR,
        xclk_hz: 12_000_000,
        flags: OMNIVISION_FLAGS,
    },
    ChipProfile {
        name: "OV9650",
        chip_ids: &[OV9650_ID],
        slv_addr: OV2640_SLV_ADDR,
        xclk_hz: 12_000_000,
        flags: OMNIVISION_FLAGS,
    },
    ChipProfile {
        name: "MT9V0XX",
        chip_ids: &[
            MT9V0X2_ID_V_1,
            MT9V0X2_ID_V_2,
            MT9V0X2_ID,
            MT9V0X2_C_ID,
            MT9V0X4_ID,
            MT9V0X4_C_ID,
        ],
        slv_addr: MT9V0XX_SLV_ADDR,
        xclk_hz: 26_666_666,
        flags: HardwareFlags {
            hsync_pol: Polarity::ActiveLow,
            mono_bpp: 1,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "MT9M114",
        chip_ids: &[MT9M114_ID],
        slv_addr: MT9M114_SLV_ADDR,
        xclk_hz: 24_000_000,
        flags: HardwareFlags {
            hsync_pol: Polarity::ActiveLow,
            mono_bpp: 2,
            rgb_swap: true,
            yuv_swap: true,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "LEPTON",
        chip_ids: &[
            LEPTON_ID, LEPTON_1_5, LEPTON_1_6, LEPTON_2_0, LEPTON_2_5, LEPTON_3_0, LEPTON_3_5,
        ],
        slv_addr: LEPTON_SLV_ADDR,
        xclk_hz: 24_000_000,
        flags: HardwareFlags {
            vsync_pol: Polarity::ActiveLow,
            hsync_pol: Polarity::ActiveLow,
            mono_bpp: 1,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "HM01B0",
        chip_ids: &[HM01B0_ID],
        slv_addr: HM0XX0_SLV_ADDR,
        xclk_hz: 6_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            raw_output: true,
            cfa_format: CfaPattern::Bggr,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "HM0360",
        chip_ids: &[HM0360_ID],
        slv_addr: HM0XX0_SLV_ADDR,
        xclk_hz: 24_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            frame_sync: true,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "GC2145",
        chip_ids: &[GC2145_ID],
        slv_addr: GC2145_SLV_ADDR,
        xclk_hz: 12_000_000,
        flags: HardwareFlags {
            mono_bpp: 2,
            rgb_swap: true,
            yuv_format: YuvOrder::Yvu,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "GENX320",
        chip_ids: &[GENX320_ID_ES, GENX320_ID_MP],
        slv_addr: GENX320_SLV_ADDR,
        xclk_hz: 20_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "PAG7920",
        chip_ids: &[PAG7920_ID],
        slv_addr: PAG7920_SLV_ADDR,
        xclk_hz: 24_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "PAG7936",
        chip_ids: &[PAG7936_ID],
        slv_addr: PAG7936_SLV_ADDR,
        xclk_hz: 24_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            raw_output: true,
            cfa_format: CfaPattern::Grbg,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "PAJ6100",
        chip_ids: &[PAJ6100_ID],
        slv_addr: PAG7920_SLV_ADDR,
        xclk_hz: 6_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            ..HardwareFlags::DEFAULT
        },
    },
    ChipProfile {
        name: "FROGEYE2020",
        chip_ids: &[FROGEYE2020_ID],
        slv_addr: FROGEYE2020_SLV_ADDR,
        xclk_hz: 12_000_000,
        flags: HardwareFlags {
            mono_bpp: 1,
            ..HardwareFlags::DEFAULT
        },
    },
];

/// Find the profile a chip identifier belongs to
pub fn lookup(chip_id: u32) -> Option<&'static ChipProfile> {
    PROFILES.iter().find(|p| p.chip_ids.contains(&chip_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_chip_ids_unique_across_profiles() {
        let mut seen = HashSet::new();
        for profile in PROFILES {
            let ids: HashSet<u32> = profile.chip_ids.iter().copied().collect();
            for id in ids {
                assert!(seen.insert(id), "{:#X} claimed twice", id);
            }
        }
    }

    #[test]
    fn test_every_profile_address_is_scanned() {
        for profile in PROFILES {
            assert!(KNOWN_ADDRESSES.contains(&profile.slv_addr), "{}", profile.name);
            assert!(!id_probes(profile.slv_addr).is_empty());
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(OV7690_ID).unwrap().name, "OV7670/OV7690");
        assert_eq!(lookup(LEPTON_3_5).unwrap().name, "LEPTON");
        assert!(lookup(0x2021).is_none());
    }

    #[test]
    fn test_shared_address_probes_in_order() {
        assert_eq!(
            id_probes(OV5640_SLV_ADDR),
            &[
                IdProbe::Byte(OV5640_CHIP_ID),
                IdProbe::Byte(GC_CHIP_ID),
                IdProbe::Long(GENX320_CHIP_ID)
            ]
        );
    }
}
