pub mod error;
pub mod escape;
pub mod factory;
pub mod frozen;
pub mod value;

pub use error::MalformedValueError;
pub use factory::ValueFactory;
pub use frozen::{freeze, freeze_default, FormerValue, FrozenValue, Thawed};
pub use value::{
    CompiledFormula, DateValue, MalformedValue, NumberValue, SaveableValue, SimpleValue,
    TagValue, TextValue, ValueKind, TAG,
};
