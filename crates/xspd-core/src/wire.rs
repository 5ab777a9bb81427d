//! Closed, string-backed enumerations of the XSPD variable protocol.
//!
//! Every enum here travels as a string on the wire ("ON", "ZLIB",
//! "SOFTWARE", ...). The `wire_enum!` macro generates an explicit
//! bidirectional name table per enum: decoding matches case-insensitively
//! against the table, encoding uses the canonical table name. The macro
//! takes every variant, so a table can never go out of sync with its enum.

use crate::error::XspdError;
use crate::value::VarValue;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Bidirectional wire-name table.
            pub const TABLE: &'static [(&'static str, $name)] =
                &[ $( ($wire, $name::$variant) ),+ ];

            /// Match a wire string case-insensitively against the table.
            pub fn from_wire(raw: &str) -> Option<Self> {
                Self::TABLE
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(raw))
                    .map(|(_, v)| *v)
            }

            /// Canonical wire name for this variant.
            pub fn as_wire(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_wire())
            }
        }

        impl VarValue for $name {
            fn decode(path: &str, value: &serde_json::Value) -> Result<Self, XspdError> {
                let raw = value.as_str().ok_or_else(|| XspdError::ValueShape {
                    path: path.to_string(),
                    expected: "enum string",
                })?;
                Self::from_wire(raw).ok_or_else(|| XspdError::EnumCast {
                    path: path.to_string(),
                    value: raw.to_string(),
                })
            }

            fn encode(&self) -> String {
                self.as_wire().to_string()
            }
        }
    };
}

wire_enum! {
    /// Generic on/off flag used by several detector variables
    /// (gating, flat-field correction, charge summing, ...).
    OnOff {
        Off = "OFF",
        On = "ON",
    }
}

wire_enum! {
    /// Compression applied to the streamed frame payload.
    Compressor {
        None = "NONE",
        Zlib = "ZLIB",
        Blosc = "BLOSC",
    }
}

wire_enum! {
    /// Byte/bit shuffle filter applied before compression.
    ShuffleMode {
        None = "NO_SHUFFLE",
        Auto = "AUTO_SHUFFLE",
        Bit = "SHUFFLE_BIT",
        Byte = "SHUFFLE_BYTE",
    }
}

wire_enum! {
    /// Acquisition trigger source.
    TriggerMode {
        Software = "SOFTWARE",
        ExtFrames = "EXT_FRAMES",
        ExtSeq = "EXT_SEQ",
    }
}

wire_enum! {
    /// Counter readout mode. DUAL produces frame pairs whose floored
    /// difference is the logical output frame.
    CounterMode {
        Single = "SINGLE",
        Dual = "DUAL",
    }
}

wire_enum! {
    /// Detector status as reported by the `status` variable.
    DetectorStatus {
        Connected = "CONNECTED",
        Ready = "READY",
        Busy = "BUSY",
    }
}

wire_enum! {
    /// Threshold selector; LOW must always be established before HIGH.
    Threshold {
        Low = "LOW",
        High = "HIGH",
    }
}

impl Threshold {
    /// Slot index inside the device's threshold vector.
    pub fn slot(&self) -> usize {
        match self {
            Threshold::Low => 0,
            Threshold::High => 1,
        }
    }
}
