//! Backend, transport and transform selection.
//!
//! Names are parsed case-insensitively and printed in canonical form.
//! Argument strings that accompany a selection are never interpreted here.

use crate::container_error::ContainerError;
use std::fmt;
use std::str::FromStr;

/// Read-side backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReadMethod {
    /// Sequential file access, all steps visible.
    #[default]
    Bp,
    /// File access through aggregating readers.
    BpAggregate,
    DataSpaces,
    Dimes,
    FlexPath,
}

impl ReadMethod {
    /// Streaming methods see one step at a time and need `advance`.
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            ReadMethod::DataSpaces | ReadMethod::Dimes | ReadMethod::FlexPath
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadMethod::Bp => "BP",
            ReadMethod::BpAggregate => "BP_AGGREGATE",
            ReadMethod::DataSpaces => "DATASPACES",
            ReadMethod::Dimes => "DIMES",
            ReadMethod::FlexPath => "FLEXPATH",
        }
    }
}

impl fmt::Display for ReadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadMethod {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BP" => Ok(ReadMethod::Bp),
            "BP_AGGREGATE" | "BP_AGG" => Ok(ReadMethod::BpAggregate),
            "DATASPACES" => Ok(ReadMethod::DataSpaces),
            "DIMES" => Ok(ReadMethod::Dimes),
            "FLEXPATH" => Ok(ReadMethod::FlexPath),
            _ => Err(ContainerError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Write-side transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransportMethod {
    Null,
    #[default]
    Posix,
    Mpi,
    MpiLustre,
    MpiAggregate,
    VarMerge,
    DataSpaces,
    Dimes,
    FlexPath,
    Phdf5,
    NetCdf4,
}

impl TransportMethod {
    const NAMES: [(TransportMethod, &'static str); 11] = [
        (TransportMethod::Null, "NULL"),
        (TransportMethod::Posix, "POSIX"),
        (TransportMethod::Mpi, "MPI"),
        (TransportMethod::MpiLustre, "MPI_LUSTRE"),
        (TransportMethod::MpiAggregate, "MPI_AGGREGATE"),
        (TransportMethod::VarMerge, "VAR_MERGE"),
        (TransportMethod::DataSpaces, "DataSpaces"),
        (TransportMethod::Dimes, "DIMES"),
        (TransportMethod::FlexPath, "FlexPath"),
        (TransportMethod::Phdf5, "PHDF5"),
        (TransportMethod::NetCdf4, "NetCDF4"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(m, _)| *m == self)
            .map(|(_, n)| *n)
            .unwrap_or("NULL")
    }

    /// The null transport accepts writes and stores nothing.
    pub fn discards_data(self) -> bool {
        self == TransportMethod::Null
    }
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMethod {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(s))
            .map(|(m, _)| *m)
            .ok_or_else(|| ContainerError::UnsupportedMethod(s.to_string()))
    }
}

/// Per-array transform tag. Stored alongside the variable, never applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Transform {
    #[default]
    None,
    Zlib,
    Bzip2,
    Szip,
}

impl Transform {
    pub fn as_str(self) -> &'static str {
        match self {
            Transform::None => "",
            Transform::Zlib => "zlib",
            Transform::Bzip2 => "bzip2",
            Transform::Szip => "szip",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::None => f.write_str("none"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for Transform {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Transform::None),
            "zlib" => Ok(Transform::Zlib),
            "bzip2" | "bzlib2" => Ok(Transform::Bzip2),
            "szip" => Ok(Transform::Szip),
            _ => Err(ContainerError::UnsupportedMethod(s.to_string())),
        }
    }
}
