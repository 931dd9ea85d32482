//! 分片（哈希桶）
//!
//! 每个分片由一把自旋锁保护，锁内是一条环形双向链表，串起当前哈希到该分片的
//! 所有缓存块。链表用缓存块下标代替指针：`prev`/`next` 存的是下标，
//! 下标 `nbuf` 表示哨兵头结点。
//!
//! 链表顺序即释放顺序：
//!
//! ```text
//! head(哨兵) <-> 最近释放 <-> ... <-> 最久未释放 <-> head
//! ```
//!
//! 除链表外，分片还保存其成员的身份（`BlockId`）与引用计数。
//! 这两个字段随缓存块在分片间迁移，因此只能在持有所属分片锁时读写。

use crate::types::BlockId;
use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

/// 链表指针（缓存块下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    prev: usize,
    next: usize,
}

/// 受分片锁保护的缓存块元数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tag {
    /// 当前代表的块，`None` 表示从未分配过
    pub(crate) id: Option<BlockId>,
    /// 活跃持有者数量（句柄与 pin 之和）
    pub(crate) refcnt: u32,
    /// `refcnt` 中由 pin 贡献的部分
    pub(crate) pins: u32,
}

impl Tag {
    /// 未分配、空闲的缓存块
    pub(crate) const fn unassigned() -> Self {
        Self {
            id: None,
            refcnt: 0,
            pins: 0,
        }
    }

    /// 刚被回收、只有一个持有者的缓存块
    pub(crate) const fn claimed(id: BlockId) -> Self {
        Self {
            id: Some(id),
            refcnt: 1,
            pins: 0,
        }
    }

    #[inline]
    pub(crate) fn is_idle(&self) -> bool {
        self.refcnt == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    link: Link,
    tag: Tag,
}

/// 一个分片的链表与成员元数据
#[derive(Debug)]
pub(crate) struct Bucket {
    /// 按缓存块下标索引，`Some` 表示该块是本分片成员
    nodes: Box<[Option<Node>]>,
    /// 哨兵头结点
    head: Link,
    len: usize,
}

impl Bucket {
    /// 创建空分片
    ///
    /// # 参数
    ///
    /// * `nbuf` - 缓存池中缓存块的总数
    pub(crate) fn new(nbuf: usize) -> Self {
        let nodes: Vec<Option<Node>> = (0..nbuf).map(|_| None).collect();
        Self {
            nodes: nodes.into_boxed_slice(),
            head: Link { prev: nbuf, next: nbuf },
            len: 0,
        }
    }

    #[inline]
    fn sentinel(&self) -> usize {
        self.nodes.len()
    }

    /// 成员或哨兵的链表指针
    ///
    /// 只对成员与哨兵调用；链表中的 `prev`/`next` 总是指向二者之一。
    fn link_mut(&mut self, index: usize) -> &mut Link {
        let sentinel = self.sentinel();
        match self.nodes.get_mut(index).and_then(Option::as_mut) {
            Some(node) => &mut node.link,
            None => {
                debug_assert_eq!(index, sentinel, "bucket link to non-member slot {}", index);
                &mut self.head
            }
        }
    }

    /// 成员数量
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// 缓存块是否是本分片成员
    pub(crate) fn contains(&self, index: usize) -> bool {
        self.nodes.get(index).map_or(false, Option::is_some)
    }

    /// 成员的元数据
    pub(crate) fn tag(&self, index: usize) -> Option<&Tag> {
        self.nodes.get(index)?.as_ref().map(|node| &node.tag)
    }

    /// 成员的元数据（可变）
    pub(crate) fn tag_mut(&mut self, index: usize) -> Option<&mut Tag> {
        self.nodes.get_mut(index)?.as_mut().map(|node| &mut node.tag)
    }

    /// 在 `prev` 与 `next` 之间插入
    fn insert_between(&mut self, index: usize, tag: Tag, prev: usize, next: usize) {
        debug_assert!(!self.contains(index), "slot {} already in bucket", index);
        self.nodes[index] = Some(Node {
            link: Link { prev, next },
            tag,
        });
        self.link_mut(prev).next = index;
        self.link_mut(next).prev = index;
        self.len += 1;
    }

    /// 插入到最近释放端
    pub(crate) fn push_front(&mut self, index: usize, tag: Tag) {
        let sentinel = self.sentinel();
        let next = self.head.next;
        self.insert_between(index, tag, sentinel, next);
    }

    /// 插入到最久未释放端
    pub(crate) fn push_back(&mut self, index: usize, tag: Tag) {
        let sentinel = self.sentinel();
        let prev = self.head.prev;
        self.insert_between(index, tag, prev, sentinel);
    }

    /// 从链表摘除，返回其元数据
    pub(crate) fn unlink(&mut self, index: usize) -> Option<Tag> {
        let node = self.nodes.get_mut(index)?.take()?;
        self.link_mut(node.link.prev).next = node.link.next;
        self.link_mut(node.link.next).prev = node.link.prev;
        self.len -= 1;
        Some(node.tag)
    }

    /// 移动到最近释放端
    pub(crate) fn move_to_front(&mut self, index: usize) {
        if self.head.next == index {
            return;
        }
        if let Some(tag) = self.unlink(index) {
            self.push_front(index, tag);
        }
    }

    /// 查找代表 `id` 的成员
    pub(crate) fn find(&self, id: BlockId) -> Option<usize> {
        self.iter()
            .find(|(_, tag)| tag.id == Some(id))
            .map(|(index, _)| index)
    }

    /// 从最近释放端开始查找第一个空闲成员
    ///
    /// 释放过的缓存块先于从未使用过的缓存块被回收。
    pub(crate) fn find_idle(&self) -> Option<usize> {
        self.iter()
            .find(|(_, tag)| tag.is_idle())
            .map(|(index, _)| index)
    }

    /// 从最近释放端向最久未释放端遍历
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Tag)> + '_ {
        let sentinel = self.sentinel();
        let mut cur = self.head.next;
        core::iter::from_fn(move || {
            if cur == sentinel {
                return None;
            }
            let node = self.nodes[cur].as_ref()?;
            let index = cur;
            cur = node.link.next;
            Some((index, &node.tag))
        })
    }
}

/// 同时持有两个分片锁（或同一个分片锁一次）
///
/// 跨分片回收缓存块时，需要同时锁住被扫描的源分片和目标分片。
/// 加锁顺序固定为分片下标升序，任何时刻最多持有两把分片锁；
/// 两把锁随 `ShardPair` 一起释放。
pub(crate) struct ShardPair<'a> {
    source: MutexGuard<'a, Bucket>,
    /// 源分片与目标分片相同时为 `None`
    target: Option<MutexGuard<'a, Bucket>>,
}

impl<'a> ShardPair<'a> {
    /// 按下标升序锁住 `source` 与 `target`
    pub(crate) fn lock(shards: &'a [Mutex<Bucket>], source: usize, target: usize) -> Self {
        if source == target {
            return Self {
                source: shards[source].lock(),
                target: None,
            };
        }

        if source < target {
            let source = shards[source].lock();
            let target = shards[target].lock();
            Self {
                source,
                target: Some(target),
            }
        } else {
            let target = shards[target].lock();
            let source = shards[source].lock();
            Self {
                source,
                target: Some(target),
            }
        }
    }

    /// 被扫描的源分片
    pub(crate) fn source(&mut self) -> &mut Bucket {
        &mut *self.source
    }

    /// 目标分片
    pub(crate) fn target(&mut self) -> &mut Bucket {
        match &mut self.target {
            Some(target) => &mut **target,
            None => &mut *self.source,
        }
    }

    /// 把源分片中的缓存块改为代表新块，并挂到目标分片
    ///
    /// 源、目标相同时原地更新元数据，不移动位置；否则从源分片摘除，
    /// 插入目标分片的最近释放端。整个过程两把锁都处于持有状态。
    ///
    /// # 返回
    ///
    /// 是否发生了跨分片迁移
    pub(crate) fn relocate(&mut self, index: usize, tag: Tag) -> bool {
        match &mut self.target {
            None => {
                if let Some(current) = self.source.tag_mut(index) {
                    *current = tag;
                }
                false
            }
            Some(target) => {
                self.source.unlink(index);
                target.push_front(index, tag);
                true
            }
        }
    }
}
