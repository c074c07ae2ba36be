//! Argument tuples.
//!
//! Handlers and proxy calls take their arguments as a tuple; each element
//! travels as one JSON parameter line.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A tuple of call arguments with a fixed arity.
pub trait ArgList: Sized + Send + 'static {
    /// Number of parameter lines a call carries.
    const ARITY: usize;

    fn into_values(self) -> serde_json::Result<Vec<Value>>;

    /// Decode arguments; missing trailing values decode from `null`.
    fn from_values(values: Vec<Value>) -> serde_json::Result<Self>;
}

macro_rules! impl_arg_list {
    ($arity:expr; $($name:ident),*) => {
        impl<$($name),*> ArgList for ($($name,)*)
        where
            $($name: Serialize + DeserializeOwned + Send + 'static,)*
        {
            const ARITY: usize = $arity;

            #[allow(non_snake_case)]
            fn into_values(self) -> serde_json::Result<Vec<Value>> {
                let ($($name,)*) = self;
                Ok(vec![$(serde_json::to_value($name)?),*])
            }

            #[allow(unused_mut, unused_variables)]
            fn from_values(values: Vec<Value>) -> serde_json::Result<Self> {
                let mut values = values.into_iter();
                Ok(($(
                    serde_json::from_value::<$name>(values.next().unwrap_or(Value::Null))?,
                )*))
            }
        }
    };
}

impl_arg_list!(0;);
impl_arg_list!(1; A);
impl_arg_list!(2; A, B);
impl_arg_list!(3; A, B, C);
impl_arg_list!(4; A, B, C, D);
impl_arg_list!(5; A, B, C, D, E);
impl_arg_list!(6; A, B, C, D, E, F);
