//! 句柄注册表
//!
//! 一个回收槽位的通用容器：`add` 优先复用空闲链表头部的索引，否则在尾部追加；
//! `remove` 释放槽位内容并把索引放回空闲链表。
//!
//! 注册表自身不加锁，所有使用者都在外部用各自的互斥锁包住它。

use std::ops::{Index, IndexMut};

use super::id::Id;

enum Slot<T> {
    Occupied(T),
    Free,
}

/// 槽位回收注册表
pub struct FreeList<T> {
    slots: Vec<Slot<T>>,
    free_indices: Vec<u32>,
    len: usize,
}

impl<T> FreeList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            len: 0,
        }
    }

    /// 存入一个值并返回它的句柄，存储不足时自动增长
    pub fn add(&mut self, value: T) -> Id {
        self.len += 1;
        if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(matches!(slot, Slot::Free));
            *slot = Slot::Occupied(value);
            return Id::new(index);
        }

        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|&i| i != u32::MAX)
            .unwrap_or_else(|| panic!("FreeList exhausted the 32-bit id space"));
        self.slots.push(Slot::Occupied(value));
        Id::new(index)
    }

    /// 移除句柄对应的值并把它交还给调用方
    ///
    /// # Panics
    ///
    /// 句柄无效或已被移除时 panic。
    pub fn take(&mut self, id: Id) -> T {
        let slot = self.slot_mut(id);
        match std::mem::replace(slot, Slot::Free) {
            Slot::Occupied(value) => {
                self.free_indices.push(id.raw());
                self.len -= 1;
                value
            }
            Slot::Free => unreachable!(),
        }
    }

    /// 移除句柄对应的值，值在这里被释放
    pub fn remove(&mut self, id: Id) {
        drop(self.take(id));
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(value)) if id.is_valid() => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: Id) -> bool {
        self.get(id).is_some()
    }

    /// 存活的值数量
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 遍历所有存活的句柄
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied(_) => Some(Id::new(i as u32)),
            Slot::Free => None,
        })
    }

    /// 取出全部存活的值，注册表回到空状态
    pub fn drain(&mut self) -> Vec<(Id, T)> {
        let slots = std::mem::take(&mut self.slots);
        self.free_indices.clear();
        self.len = 0;
        slots
            .into_iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied(value) => Some((Id::new(i as u32), value)),
                Slot::Free => None,
            })
            .collect()
    }

    fn slot_mut(&mut self, id: Id) -> &mut Slot<T> {
        assert!(id.is_valid(), "invalid id");
        match self.slots.get_mut(id.index()) {
            Some(slot @ Slot::Occupied(_)) => slot,
            Some(Slot::Free) => panic!("{:?} refers to a removed slot", id),
            None => panic!("{:?} is out of range", id),
        }
    }
}

impl<T: Default> FreeList<T> {
    /// 存入一个默认构造的值
    pub fn add_default(&mut self) -> Id {
        self.add(T::default())
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id> for FreeList<T> {
    type Output = T;

    fn index(&self, id: Id) -> &T {
        assert!(id.is_valid(), "invalid id");
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(value)) => value,
            Some(Slot::Free) => panic!("{:?} refers to a removed slot", id),
            None => panic!("{:?} is out of range", id),
        }
    }
}

impl<T> IndexMut<Id> for FreeList<T> {
    fn index_mut(&mut self, id: Id) -> &mut T {
        match self.slot_mut(id) {
            Slot::Occupied(value) => value,
            Slot::Free => unreachable!(),
        }
    }
}
