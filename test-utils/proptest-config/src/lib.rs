use std::ops::Deref;
use std::str::FromStr;
use std::sync::LazyLock;

fn try_parse_env<T>(env: &str) -> Option<T>
where
    T: FromStr,
{
    match std::env::var(env) {
        Ok(value) => Some(
            T::from_str(&value)
                .unwrap_or_else(|_| panic!("Invalid value for {}", env)),
        ),
        Err(_) => None,
    }
}

/// The value of a strategy configuration parameter and its provenance.
pub enum Configuration<T> {
    Default(T),
    Environmental(T),
}

impl<T> Configuration<T> {
    /// Converts to [Option<T>], returning the wrapped value
    /// if this is [Environmental] and [None] otherwise.
    pub fn environmental(&self) -> Option<T>
    where
        T: Copy,
    {
        match self {
            Self::Default(_) => None,
            Self::Environmental(value) => Some(*value),
        }
    }
}

impl<T> Deref for Configuration<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Default(ref value) => value,
            Self::Environmental(ref value) => value,
        }
    }
}

macro_rules! config_param {
    ($name:ident, $type:ty, $default:expr) => {
        pub static $name: LazyLock<Configuration<$type>> =
            LazyLock::new(|| {
                if let Some(value) = try_parse_env::<$type>(stringify!($name)) {
                    Configuration::Environmental(value)
                } else {
                    Configuration::Default($default)
                }
            });
    };
}

// reader/src/fragment/strategy.rs
config_param!(CELLSTORE_STRATEGY_FRAGMENT_PARAMETERS_COUNT_MIN, usize, 1);
config_param!(CELLSTORE_STRATEGY_FRAGMENT_PARAMETERS_COUNT_MAX, usize, 4);

// reader/src/query/strategy.rs
config_param!(CELLSTORE_STRATEGY_CELLS_PARAMETERS_NUM_RECORDS_MIN, usize, 0);
config_param!(CELLSTORE_STRATEGY_CELLS_PARAMETERS_NUM_RECORDS_MAX, usize, 64);
config_param!(CELLSTORE_STRATEGY_CELLS_PARAMETERS_CELL_VAR_SIZE_MIN, usize, 0);
config_param!(CELLSTORE_STRATEGY_CELLS_PARAMETERS_CELL_VAR_SIZE_MAX, usize, 16);
