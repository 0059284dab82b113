// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bookkeeping of the action frame exchanges that run under a randomized source MAC. The
//! firmware only accepts frames addressed to a random MAC while a filter for it is programmed,
//! so every exchange registers its cookie in the bucket of its MAC. A bucket owns a filter
//! exactly while it holds at least one cookie.

use {
    crate::{completion::Completion, error::Error, Cookie, IfaceId},
    std::sync::Arc,
    wlan_common::mac::MacAddr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieEntry {
    pub iface: IfaceId,
    pub cookie: Cookie,
}

enum BucketState {
    /// The filter is being programmed; resolves with whether that worked.
    Programming(Arc<Completion<bool>>),
    Active,
}

struct Bucket {
    mac: MacAddr,
    /// The interface the filter was programmed through.
    iface: IfaceId,
    cookies: Vec<CookieEntry>,
    state: BucketState,
}

#[derive(Debug)]
pub enum Appended {
    /// The MAC already had a programmed filter.
    Existing { bucket: usize },
    /// The filter of the MAC is still being programmed by another caller. The frame may only go
    /// out once `programmed` resolves with true.
    Joined { bucket: usize, programmed: Arc<Completion<bool>> },
    /// A free bucket was claimed; its filter must be programmed and `programmed` resolved before
    /// the frame goes out.
    NewBucket { bucket: usize, programmed: Arc<Completion<bool>> },
}

/// A bucket whose last cookie is gone. Its filter must be cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreedBucket {
    pub bucket: usize,
    pub iface: IfaceId,
    pub mac: MacAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deleted {
    Removed { bucket: usize },
    BucketFreed(FreedBucket),
    NotFound,
}

/// Outcome of programming the filter of a new bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Programmed {
    Active,
    /// Every cookie left while the filter was programmed. The filter must be cleared again.
    Orphaned(FreedBucket),
    /// The bucket is gone along with the cookies that joined it.
    Failed(Vec<CookieEntry>),
}

pub struct RandomMacTable {
    slots: Vec<Option<Bucket>>,
}

impl RandomMacTable {
    pub fn new(slots: usize) -> Self {
        Self { slots: (0..slots).map(|_| None).collect() }
    }

    pub fn append_cookie(
        &mut self,
        iface: IfaceId,
        mac: MacAddr,
        cookie: Cookie,
    ) -> Result<Appended, Error> {
        let entry = CookieEntry { iface, cookie };
        if let Some((bucket, b)) = self.buckets_mut().find(|(_, b)| b.mac == mac) {
            if !b.cookies.contains(&entry) {
                b.cookies.push(entry);
            }
            return Ok(match &b.state {
                BucketState::Active => Appended::Existing { bucket },
                BucketState::Programming(programmed) => {
                    Appended::Joined { bucket, programmed: programmed.clone() }
                }
            });
        }
        let bucket =
            self.slots.iter().position(|slot| slot.is_none()).ok_or(Error::ResourceExhausted)?;
        let programmed = Completion::new();
        self.slots[bucket] = Some(Bucket {
            mac,
            iface,
            cookies: vec![entry],
            state: BucketState::Programming(programmed.clone()),
        });
        Ok(Appended::NewBucket { bucket, programmed })
    }

    /// Settles a bucket claimed by `append_cookie` once its filter was programmed, or failed to.
    pub fn finish_programming(&mut self, bucket: usize, success: bool) -> Programmed {
        let b = match self.slots.get_mut(bucket).and_then(Option::as_mut) {
            Some(b) if matches!(b.state, BucketState::Programming(_)) => b,
            _ => return Programmed::Failed(vec![]),
        };
        if success && !b.cookies.is_empty() {
            b.state = BucketState::Active;
            return Programmed::Active;
        }
        let (mac, iface) = (b.mac, b.iface);
        let cookies = std::mem::take(&mut b.cookies);
        self.slots[bucket] = None;
        if success {
            Programmed::Orphaned(FreedBucket { bucket, iface, mac })
        } else {
            Programmed::Failed(cookies)
        }
    }

    pub fn delete_cookie(&mut self, cookie: Cookie) -> Deleted {
        let found = self.buckets_mut().find_map(|(bucket, b)| {
            b.cookies.iter().position(|e| e.cookie == cookie).map(|i| (bucket, b.cookies.remove(i)))
        });
        match found {
            None => Deleted::NotFound,
            Some((bucket, _)) => match self.release_if_empty(bucket) {
                Some(freed) => Deleted::BucketFreed(freed),
                None => Deleted::Removed { bucket },
            },
        }
    }

    /// Removes every cookie registered by `iface`.
    pub fn delete_all(&mut self, iface: IfaceId) -> Vec<FreedBucket> {
        let mut touched = vec![];
        for (bucket, b) in self.buckets_mut() {
            let before = b.cookies.len();
            b.cookies.retain(|e| e.iface != iface);
            if b.cookies.len() != before {
                touched.push(bucket);
            }
        }
        touched.into_iter().filter_map(|bucket| self.release_if_empty(bucket)).collect()
    }

    pub fn contains(&self, cookie: Cookie) -> bool {
        self.slots.iter().flatten().any(|b| b.cookies.iter().any(|e| e.cookie == cookie))
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn bucket_of(&self, mac: &MacAddr) -> Option<usize> {
        self.slots.iter().position(|slot| slot.as_ref().map_or(false, |b| &b.mac == mac))
    }

    fn buckets_mut(&mut self) -> impl Iterator<Item = (usize, &mut Bucket)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| slot.as_mut().map(|b| (i, b)))
    }

    /// A bucket still being programmed keeps its slot until `finish_programming` settles it.
    fn release_if_empty(&mut self, bucket: usize) -> Option<FreedBucket> {
        match &self.slots[bucket] {
            Some(b) if b.cookies.is_empty() && matches!(b.state, BucketState::Active) => {
                let freed = FreedBucket { bucket, iface: b.iface, mac: b.mac };
                self.slots[bucket] = None;
                Some(freed)
            }
            _ => None,
        }
    }
}
