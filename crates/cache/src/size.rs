//! Structural size estimation.
//!
//! Sizes are computed from the shape of a value (lengths of its buffers plus
//! fixed overheads), never by serializing it.

use std::mem::size_of;
use std::sync::Arc;

/// Approximate heap + inline footprint of a value in bytes.
pub trait SizeEstimate {
  fn estimated_size(&self) -> usize;
}

impl SizeEstimate for str {
  fn estimated_size(&self) -> usize {
    self.len()
  }
}

impl SizeEstimate for String {
  fn estimated_size(&self) -> usize {
    size_of::<String>() + self.len()
  }
}

impl<const N: usize> SizeEstimate for [u8; N] {
  fn estimated_size(&self) -> usize {
    N
  }
}

impl<T: SizeEstimate> SizeEstimate for Vec<T> {
  fn estimated_size(&self) -> usize {
    size_of::<Vec<T>>() + self.iter().map(SizeEstimate::estimated_size).sum::<usize>()
  }
}

impl<T: SizeEstimate> SizeEstimate for Option<T> {
  fn estimated_size(&self) -> usize {
    size_of::<Option<T>>() + self.as_ref().map_or(0, SizeEstimate::estimated_size)
  }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Arc<T> {
  fn estimated_size(&self) -> usize {
    (**self).estimated_size()
  }
}

macro_rules! fixed_size {
  ($($t:ty),*) => {
    $(impl SizeEstimate for $t {
      fn estimated_size(&self) -> usize {
        size_of::<$t>()
      }
    })*
  };
}

fixed_size!(u8, u16, u32, u64, usize, i32, i64, f32, f64, bool);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_string_counts_bytes_plus_header() {
    let s = "hello".to_string();
    assert_eq!(s.estimated_size(), size_of::<String>() + 5);
    assert_eq!("hello".estimated_size(), 5);
  }

  #[test]
  fn test_vec_of_u8_counts_each_byte() {
    let v: Vec<u8> = vec![0; 100];
    assert_eq!(v.estimated_size(), size_of::<Vec<u8>>() + 100);
  }

  #[test]
  fn test_nested_structures() {
    let v = vec!["ab".to_string(), "cde".to_string()];
    let expected = size_of::<Vec<String>>() + 2 * size_of::<String>() + 5;
    assert_eq!(v.estimated_size(), expected);

    let none: Option<String> = None;
    assert_eq!(none.estimated_size(), size_of::<Option<String>>());
  }

  #[test]
  fn test_arc_delegates() {
    let a: Arc<str> = Arc::from("four");
    assert_eq!(a.estimated_size(), 4);
  }
}
