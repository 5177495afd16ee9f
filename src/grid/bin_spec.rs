//! Parser for the `FLUXERRMAP_BINS` entries.
//!
//! Each entry of the configuration list is either
//!
//! ```text
//! SBMAG   8  20   28     # VARNAME NBIN MIN MAX
//! FILTER                 # or BAND: one bin per filter identity
//! ```
//!
//! YAML already strips trailing `#` comments, so the parser only sees the tokens.
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res},
    number::complete::double,
    sequence::{preceded, terminated},
    IResult, Parser,
};

use crate::{constants::FILTER_MARKERS, fluxerr_errors::FluxErrError};

/// One declared map dimension, as written in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BinSpec {
    /// The `FILTER`/`BAND` marker.
    Filter,
    /// Uniform bins of a table column.
    Continuous {
        name: String,
        nbin: usize,
        min: f64,
        max: f64,
    },
}

fn is_varname_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_filter_marker(input: &str) -> IResult<&str, BinSpec> {
    map(
        terminated(
            alt((tag(FILTER_MARKERS[0]), tag(FILTER_MARKERS[1]))),
            multispace0,
        ),
        |_| BinSpec::Filter,
    )
    .parse(input)
}

fn parse_nbin(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |digits: &str| digits.parse::<usize>()).parse(input)
}

fn parse_continuous(input: &str) -> IResult<&str, BinSpec> {
    map(
        terminated(
            (
                take_while1(is_varname_char),
                preceded(multispace1, parse_nbin),
                preceded(multispace1, double),
                preceded(multispace1, double),
            ),
            multispace0,
        ),
        |(name, nbin, min, max): (&str, usize, f64, f64)| BinSpec::Continuous {
            name: name.to_string(),
            nbin,
            min,
            max,
        },
    )
    .parse(input)
}

/// Parse one `FLUXERRMAP_BINS` entry.
///
/// Return
/// ----------
/// * The parsed [`BinSpec`], or [`FluxErrError::MalformedBinSpec`] carrying the offending entry.
///   Range and bin-count validation happens later, when the grid is built.
pub fn parse_bin_spec(entry: &str) -> Result<BinSpec, FluxErrError> {
    let entry = entry.trim();
    alt((
        all_consuming(parse_filter_marker),
        all_consuming(parse_continuous),
    ))
    .parse(entry)
    .map(|(_, spec)| spec)
    .map_err(|_| FluxErrError::MalformedBinSpec(entry.to_string()))
}

#[cfg(test)]
mod test_bin_spec {
    use super::*;

    #[test]
    fn test_parse_continuous() {
        let spec = parse_bin_spec("SBMAG   8  20   28").unwrap();
        assert_eq!(
            spec,
            BinSpec::Continuous {
                name: "SBMAG".into(),
                nbin: 8,
                min: 20.0,
                max: 28.0
            }
        );

        let spec = parse_bin_spec("  PSF 3 1.0 4.0  ").unwrap();
        assert_eq!(
            spec,
            BinSpec::Continuous {
                name: "PSF".into(),
                nbin: 3,
                min: 1.0,
                max: 4.0
            }
        );

        let spec = parse_bin_spec("LOG_SNR 5 -0.5 2.3").unwrap();
        assert_eq!(
            spec,
            BinSpec::Continuous {
                name: "LOG_SNR".into(),
                nbin: 5,
                min: -0.5,
                max: 2.3
            }
        );
    }

    #[test]
    fn test_parse_filter_markers() {
        assert_eq!(parse_bin_spec("FILTER").unwrap(), BinSpec::Filter);
        assert_eq!(parse_bin_spec("BAND ").unwrap(), BinSpec::Filter);
    }

    #[test]
    fn test_parse_malformed() {
        for bad in ["", "SBMAG", "SBMAG 8 20", "SBMAG x 20 28", "SBMAG 8 20 28 9", "FILTER 3"] {
            assert_eq!(
                parse_bin_spec(bad),
                Err(FluxErrError::MalformedBinSpec(bad.trim().to_string())),
                "entry '{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_marker_prefix_is_a_variable() {
        let spec = parse_bin_spec("BANDWIDTH 2 0 1").unwrap();
        assert!(matches!(spec, BinSpec::Continuous { ref name, .. } if name == "BANDWIDTH"));
    }
}
