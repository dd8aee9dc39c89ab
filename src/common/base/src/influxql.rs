/// MIN_TIME is the minumum time that can be represented.
///
/// 1677-09-21 00:12:43.145224194 +0000 UTC
///
/// The two lowest minimum integers are used as sentinel values.  The
/// minimum value needs to be used as a value lower than any other value for
/// comparisons and another separate value is needed to act as a sentinel
/// default value that is unusable by the user, but usable internally.
/// Because these two values need to be used for a special purpose, we do
/// not allow users to write points at these two times.
pub const MIN_TIME: i64 = i64::MIN + 2;

/// MAX_TIME is the maximum time that can be represented.
///
/// 2262-04-11 23:47:16.854775806 +0000 UTC
pub const MAX_TIME: i64 = i64::MAX - 1;

/// DataType represents the primitive field types a point can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Float means the data type is a float.
    Float,
    /// Integer means the data type is an integer.
    Integer,
    /// String means the data type is a string of text.
    String,
    /// Boolean means the data type is a boolean.
    Boolean,
}

impl DataType {
    pub fn value(&self) -> u8 {
        match self {
            DataType::Float => 1,
            DataType::Integer => 2,
            DataType::String => 3,
            DataType::Boolean => 4,
        }
    }

    pub fn from_value(v: u8) -> Option<Self> {
        match v {
            1 => Some(DataType::Float),
            2 => Some(DataType::Integer),
            3 => Some(DataType::String),
            4 => Some(DataType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Float => "float",
            DataType::Integer => "integer",
            DataType::String => "string",
            DataType::Boolean => "boolean",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
