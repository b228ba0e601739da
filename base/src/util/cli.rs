use std::fmt::Debug;
use std::str::FromStr;

use arrayvec::ArrayVec;

use crate::defs::{Error, ErrorKind::*, Result};

// Comma-separated fixed-size value list, e.g. "0,180,0".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Array<T: FromStr, const N: usize>(pub [T; N]);

impl<T: Debug + Default + FromStr, const N: usize> FromStr for Array<T, N> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed_err = || {
            let desc = format!("malformed value array '{}'", s);
            Error::new(MalformedData, desc)
        };

        let parse = |iter: &mut std::str::Split<char>| {
            let part = iter.next().ok_or_else(malformed_err)?.trim();
            if part.is_empty() {
                Ok(T::default())
            } else {
                part.parse::<T>().map_err(|_| malformed_err())
            }
        };

        let mut iter = s.split(',');
        let mut vec = ArrayVec::<T, N>::new();

        for _ in 0..N {
            vec.push(parse(&mut iter)?);
        }

        if iter.next().is_some() {
            return Err(malformed_err());
        }

        vec.into_inner().map(Array).map_err(|_| malformed_err())
    }
}

impl<T: FromStr, const N: usize> From<[T; N]> for Array<T, N> {
    fn from(array: [T; N]) -> Self {
        Self(array)
    }
}
