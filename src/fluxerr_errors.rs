use thiserror::Error;

#[derive(Error, Debug)]
pub enum FluxErrError {
    #[error("Cannot process NDIM={0}: maps support 1 to 4 dimensions")]
    UnsupportedDimensionality(usize),

    #[error("Malformed map bin definition: '{0}' (expected 'VARNAME NBIN MIN MAX' or FILTER)")]
    MalformedBinSpec(String),

    #[error("Invalid number of bins for {name}: {nbin} (must be at least 1)")]
    InvalidBinCount { name: String, nbin: usize },

    #[error("Invalid range for {name}: min={min} must be below max={max}")]
    InvalidBinRange { name: String, min: f64, max: f64 },

    #[error("Map dimension {0} is declared twice")]
    DuplicateDimension(String),

    #[error("{categorical} must be declared before continuous map variables (found after {continuous})")]
    CategoricalAfterContinuous {
        categorical: String,
        continuous: String,
    },

    #[error("Missing required key {0} in configuration")]
    MissingConfigKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidConfigValue { key: String, value: String },

    #[error("Unable to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    #[error("Flux table {0} has no header line")]
    EmptyTable(String),

    #[error("Missing column {column} in flux table {table}")]
    MissingColumn { table: String, column: String },

    #[error("Line {line} of {table} has {found} values, header has {expected}")]
    RaggedRow {
        table: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value '{value}' in column {column} of {table}")]
    InvalidTableValue {
        table: String,
        column: String,
        value: String,
    },

    #[error("FIELD={field} is not in {groups}. See FIELDS arg in input file.")]
    FieldNotInGroup { field: String, groups: String },

    #[error("IFILTOBS={0} is outside the filter index range [0, {1})")]
    FilterOutOfRange(i64, usize),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),
}

impl PartialEq for FluxErrError {
    fn eq(&self, other: &Self) -> bool {
        use FluxErrError::*;
        match (self, other) {
            (UnsupportedDimensionality(a), UnsupportedDimensionality(b)) => a == b,
            (MalformedBinSpec(a), MalformedBinSpec(b)) => a == b,
            (
                InvalidBinCount { name: a, nbin: na },
                InvalidBinCount { name: b, nbin: nb },
            ) => a == b && na == nb,
            (
                InvalidBinRange {
                    name: a,
                    min: mina,
                    max: maxa,
                },
                InvalidBinRange {
                    name: b,
                    min: minb,
                    max: maxb,
                },
            ) => a == b && mina == minb && maxa == maxb,
            (DuplicateDimension(a), DuplicateDimension(b)) => a == b,
            (
                CategoricalAfterContinuous {
                    categorical: ca,
                    continuous: na,
                },
                CategoricalAfterContinuous {
                    categorical: cb,
                    continuous: nb,
                },
            ) => ca == cb && na == nb,
            (MissingConfigKey(a), MissingConfigKey(b)) => a == b,
            (
                InvalidConfigValue { key: ka, value: va },
                InvalidConfigValue { key: kb, value: vb },
            ) => ka == kb && va == vb,
            (EmptyTable(a), EmptyTable(b)) => a == b,
            (
                MissingColumn {
                    table: ta,
                    column: ca,
                },
                MissingColumn {
                    table: tb,
                    column: cb,
                },
            ) => ta == tb && ca == cb,
            (
                RaggedRow {
                    table: ta,
                    line: la,
                    expected: ea,
                    found: fa,
                },
                RaggedRow {
                    table: tb,
                    line: lb,
                    expected: eb,
                    found: fb,
                },
            ) => ta == tb && la == lb && ea == eb && fa == fb,
            (
                InvalidTableValue {
                    table: ta,
                    column: ca,
                    value: va,
                },
                InvalidTableValue {
                    table: tb,
                    column: cb,
                    value: vb,
                },
            ) => ta == tb && ca == cb && va == vb,
            (
                FieldNotInGroup {
                    field: fa,
                    groups: ga,
                },
                FieldNotInGroup {
                    field: fb,
                    groups: gb,
                },
            ) => fa == fb && ga == gb,
            (FilterOutOfRange(a, ma), FilterOutOfRange(b, mb)) => a == b && ma == mb,

            // not comparable: same variant is enough
            (YamlError(_), YamlError(_)) => true,
            (IoError(_), IoError(_)) => true,

            _ => false,
        }
    }
}
