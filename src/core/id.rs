//! 不透明的 32 位资源句柄

use std::fmt;

/// 资源句柄
///
/// 低位是注册表内部的稠密槽位索引。槽位被移除后索引可能被复用，
/// 所以句柄在其对应的 `remove` 之后不再有意义。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Id(u32);

impl Id {
    /// 表示“无效”的保留值
    pub const INVALID: Id = Id(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        debug_assert!(index != u32::MAX);
        Self(index)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Id({})", self.0)
        } else {
            f.write_str("Id(INVALID)")
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_id() {
        assert!(!Id::INVALID.is_valid());
        assert!(!Id::default().is_valid());
        assert!(Id::new(0).is_valid());
        assert_eq!(Id::from_raw(7).index(), 7);
        assert_eq!(format!("{:?}", Id::INVALID), "Id(INVALID)");
    }
}
