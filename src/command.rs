use bytes::Bytes;

use crate::resp::RespValue;

/// Anything that can be sent as a single command argument.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

macro_rules! integer_to_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

integer_to_arg!(i32, i64, u16, u32, u64, usize);

/// A Redis command name with its arguments.
///
/// The name is upper-cased on construction, so `Command::new("get")` and
/// `Command::new("GET")` are the same command.
///
/// ```
/// use mcredis::command::Command;
///
/// let cmd = Command::new("expire").arg("session").arg(100);
/// assert_eq!(cmd.name(), "EXPIRE");
/// assert_eq!(cmd.args().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_uppercase(),
            args: Vec::new(),
        }
    }

    pub fn arg<T: ToArg>(mut self, arg: T) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    pub fn args_from<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Argument at `index` as text, if it is valid UTF-8.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|a| std::str::from_utf8(a).ok())
    }

    pub fn to_resp(&self) -> RespValue {
        let mut elements = Vec::with_capacity(self.args.len() + 1);
        elements.push(RespValue::from(self.name.as_str()));
        elements.extend(self.args.iter().cloned().map(RespValue::BulkString));

        RespValue::Array(elements)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_resp().encode()
    }
}
