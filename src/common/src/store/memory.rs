use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EntityStore, StoreError};
use crate::model::{
    AsnRecord, BgpPrefixRecord, Collection, Counter, DocId, IpBlockRecord, IpRecord, LinkArray,
    OrgRecord, Record, RefValue, Reference,
};

#[derive(Debug, Default)]
struct Collections {
    ip: BTreeMap<String, IpRecord>,
    bgppref: BTreeMap<String, BgpPrefixRecord>,
    ipblock: BTreeMap<String, IpBlockRecord>,
    asn: BTreeMap<i64, AsnRecord>,
    org: BTreeMap<String, OrgRecord>,
}

impl Collections {
    fn counter_slot(&mut self, counter: Counter, id: &DocId) -> Option<&mut i64> {
        let key = id.as_text()?;
        match counter {
            Counter::BgpPrefixRefCnt => self.bgppref.get_mut(key).map(|r| &mut r.ref_cnt),
            Counter::IpBlockRefCnt => self.ipblock.get_mut(key).map(|r| &mut r.ref_cnt),
            Counter::OrgRefCnt => self.org.get_mut(key).map(|r| &mut r.ref_cnt),
        }
    }

    fn array_slot(&mut self, array: LinkArray, id: &DocId) -> Option<&mut Vec<RefValue>> {
        match array {
            LinkArray::AsnBgpPrefixes => self
                .asn
                .get_mut(&id.as_int()?)
                .map(|r| &mut r.bgppref),
            LinkArray::BgpPrefixAsns => self
                .bgppref
                .get_mut(id.as_text()?)
                .map(|r| &mut r.asn),
        }
    }

    fn counters(&self, counter: Counter) -> Vec<(DocId, i64)> {
        match counter {
            Counter::BgpPrefixRefCnt => self
                .bgppref
                .values()
                .map(|r| (DocId::from(r.id.as_str()), r.ref_cnt))
                .collect(),
            Counter::IpBlockRefCnt => self
                .ipblock
                .values()
                .map(|r| (DocId::from(r.id.as_str()), r.ref_cnt))
                .collect(),
            Counter::OrgRefCnt => self
                .org
                .values()
                .map(|r| (DocId::from(r.id.as_str()), r.ref_cnt))
                .collect(),
        }
    }

    fn arrays(&self, array: LinkArray) -> Vec<(DocId, Vec<RefValue>)> {
        match array {
            LinkArray::AsnBgpPrefixes => self
                .asn
                .values()
                .map(|r| (DocId::Int(r.id), r.bgppref.clone()))
                .collect(),
            LinkArray::BgpPrefixAsns => self
                .bgppref
                .values()
                .map(|r| (DocId::from(r.id.as_str()), r.asn.clone()))
                .collect(),
        }
    }
}

/// In-process [`EntityStore`] keeping every collection in ordered maps.
///
/// Mirrors the semantics of the SQL backend and is used by tests and local
/// experiments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given documents.
    pub async fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let store = Self::new();
        {
            let mut collections = store.inner.write().await;
            for record in records {
                put(&mut collections, record);
            }
        }
        store
    }
}

fn put(collections: &mut Collections, record: Record) {
    match record {
        Record::Ip(r) => {
            collections.ip.insert(r.id.clone(), r);
        }
        Record::BgpPrefix(r) => {
            collections.bgppref.insert(r.id.clone(), r);
        }
        Record::IpBlock(r) => {
            collections.ipblock.insert(r.id.clone(), r);
        }
        Record::Asn(r) => {
            collections.asn.insert(r.id, r);
        }
        Record::Org(r) => {
            collections.org.insert(r.id.clone(), r);
        }
    }
}

fn retain_count<K: Ord, V>(map: &mut BTreeMap<K, V>, mut keep: impl FnMut(&V) -> bool) -> u64 {
    let before = map.len();
    map.retain(|_, v| keep(v));
    (before - map.len()) as u64
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert(&self, record: Record) -> Result<(), StoreError> {
        put(&mut *self.inner.write().await, record);
        Ok(())
    }

    async fn fetch(
        &self,
        collection: Collection,
        id: &DocId,
    ) -> Result<Option<Record>, StoreError> {
        let collections = self.inner.read().await;
        let record = match (collection, id) {
            (Collection::Ip, DocId::Text(key)) => collections.ip.get(key).cloned().map(Record::Ip),
            (Collection::BgpPrefix, DocId::Text(key)) => collections
                .bgppref
                .get(key)
                .cloned()
                .map(Record::BgpPrefix),
            (Collection::IpBlock, DocId::Text(key)) => collections
                .ipblock
                .get(key)
                .cloned()
                .map(Record::IpBlock),
            (Collection::Asn, DocId::Int(key)) => {
                collections.asn.get(key).cloned().map(Record::Asn)
            }
            (Collection::Org, DocId::Text(key)) => {
                collections.org.get(key).cloned().map(Record::Org)
            }
            _ => None,
        };
        Ok(record)
    }

    async fn count_documents(&self, collection: Collection) -> Result<u64, StoreError> {
        let collections = self.inner.read().await;
        let count = match collection {
            Collection::Ip => collections.ip.len(),
            Collection::BgpPrefix => collections.bgppref.len(),
            Collection::IpBlock => collections.ipblock.len(),
            Collection::Asn => collections.asn.len(),
            Collection::Org => collections.org.len(),
        };
        Ok(count as u64)
    }

    async fn list_ids(&self, collection: Collection) -> Result<Vec<DocId>, StoreError> {
        let collections = self.inner.read().await;
        let ids = match collection {
            Collection::Ip => collections.ip.keys().map(|k| DocId::from(k.as_str())).collect(),
            Collection::BgpPrefix => collections
                .bgppref
                .keys()
                .map(|k| DocId::from(k.as_str()))
                .collect(),
            Collection::IpBlock => collections
                .ipblock
                .keys()
                .map(|k| DocId::from(k.as_str()))
                .collect(),
            Collection::Asn => collections.asn.keys().map(|k| DocId::Int(*k)).collect(),
            Collection::Org => collections.org.keys().map(|k| DocId::from(k.as_str())).collect(),
        };
        Ok(ids)
    }

    async fn reset_counter(&self, counter: Counter) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let touched = match counter {
            Counter::BgpPrefixRefCnt => {
                collections.bgppref.values_mut().for_each(|r| r.ref_cnt = 0);
                collections.bgppref.len()
            }
            Counter::IpBlockRefCnt => {
                collections.ipblock.values_mut().for_each(|r| r.ref_cnt = 0);
                collections.ipblock.len()
            }
            Counter::OrgRefCnt => {
                collections.org.values_mut().for_each(|r| r.ref_cnt = 0);
                collections.org.len()
            }
        };
        Ok(touched as u64)
    }

    async fn group_references(
        &self,
        reference: Reference,
    ) -> Result<Vec<(DocId, u64)>, StoreError> {
        let collections = self.inner.read().await;
        let values: Vec<&String> = match reference {
            Reference::IpBgpPrefix => collections
                .ip
                .values()
                .filter_map(|r| r.bgppref.as_ref())
                .collect(),
            Reference::IpIpBlock => collections
                .ip
                .values()
                .filter_map(|r| r.ipblock.as_ref())
                .collect(),
            Reference::AsnOrg => collections
                .asn
                .values()
                .filter_map(|r| r.org.as_ref())
                .collect(),
            Reference::IpBlockOrg => collections
                .ipblock
                .values()
                .filter_map(|r| r.org.as_ref())
                .collect(),
        };

        let mut groups: HashMap<&String, u64> = HashMap::new();
        for value in values {
            *groups.entry(value).or_default() += 1;
        }

        let mut groups: Vec<(DocId, u64)> = groups
            .into_iter()
            .map(|(key, count)| (DocId::from(key.as_str()), count))
            .collect();
        groups.sort();
        Ok(groups)
    }

    async fn set_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
    ) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let mut matched = 0;
        for (id, count) in counts {
            if let Some(slot) = collections.counter_slot(counter, id) {
                *slot = *count as i64;
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn increment_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
    ) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let mut matched = 0;
        for (id, count) in counts {
            if let Some(slot) = collections.counter_slot(counter, id) {
                *slot += *count as i64;
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn load_counters(&self, counter: Counter) -> Result<Vec<(DocId, i64)>, StoreError> {
        Ok(self.inner.read().await.counters(counter))
    }

    async fn reset_array(&self, array: LinkArray) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let touched = match array {
            LinkArray::AsnBgpPrefixes => {
                collections.asn.values_mut().for_each(|r| r.bgppref.clear());
                collections.asn.len()
            }
            LinkArray::BgpPrefixAsns => {
                collections.bgppref.values_mut().for_each(|r| r.asn.clear());
                collections.bgppref.len()
            }
        };
        Ok(touched as u64)
    }

    async fn array_entries(
        &self,
        array: LinkArray,
    ) -> Result<Vec<(DocId, Vec<RefValue>)>, StoreError> {
        Ok(self.inner.read().await.arrays(array))
    }

    async fn set_arrays(
        &self,
        array: LinkArray,
        links: &[(DocId, Vec<DocId>)],
    ) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let mut matched = 0;
        for (id, targets) in links {
            if let Some(slot) = collections.array_slot(array, id) {
                *slot = targets.iter().cloned().map(RefValue::from).collect();
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn delete_zero_counter(&self, counter: Counter) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let removed = match counter {
            Counter::BgpPrefixRefCnt => retain_count(&mut collections.bgppref, |r| r.ref_cnt != 0),
            Counter::IpBlockRefCnt => retain_count(&mut collections.ipblock, |r| r.ref_cnt != 0),
            Counter::OrgRefCnt => retain_count(&mut collections.org, |r| r.ref_cnt != 0),
        };
        Ok(removed)
    }

    async fn delete_empty_array(&self, array: LinkArray) -> Result<u64, StoreError> {
        let mut collections = self.inner.write().await;
        let removed = match array {
            LinkArray::AsnBgpPrefixes => {
                retain_count(&mut collections.asn, |r| !r.bgppref.is_empty())
            }
            LinkArray::BgpPrefixAsns => {
                retain_count(&mut collections.bgppref, |r| !r.asn.is_empty())
            }
        };
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        MemoryStore::with_records([
            IpRecord::new("192.0.2.1").with_bgppref("192.0.2.0/24").into(),
            IpRecord::new("192.0.2.2").with_bgppref("192.0.2.0/24").into(),
            IpRecord::new("198.51.100.1").into(),
            BgpPrefixRecord::new("192.0.2.0/24").with_ref_cnt(7).into(),
            BgpPrefixRecord::new("198.51.100.0/24").with_ref_cnt(2).into(),
            AsnRecord::new(64500).with_prefixes(["192.0.2.0/24"]).into(),
        ])
        .await
    }

    #[tokio::test]
    async fn test_group_references_skips_absent_fields() {
        let store = seeded().await;
        let groups = store.group_references(Reference::IpBgpPrefix).await.unwrap();
        assert_eq!(groups, vec![(DocId::from("192.0.2.0/24"), 2)]);
    }

    #[tokio::test]
    async fn test_set_counters_ignores_missing_documents() {
        let store = seeded().await;
        let matched = store
            .set_counters(
                Counter::BgpPrefixRefCnt,
                &[(DocId::from("192.0.2.0/24"), 3), (DocId::from("missing"), 1)],
            )
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let record = store
            .fetch(Collection::BgpPrefix, &DocId::from("192.0.2.0/24"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.ref_cnt(), Some(3));
    }

    #[tokio::test]
    async fn test_increment_accumulates() {
        let store = MemoryStore::with_records([OrgRecord::new("ORG1").into()]).await;
        let counts = [(DocId::from("ORG1"), 2u64)];
        store
            .increment_counters(Counter::OrgRefCnt, &counts)
            .await
            .unwrap();
        store
            .increment_counters(Counter::OrgRefCnt, &counts)
            .await
            .unwrap();
        let counters = store.load_counters(Counter::OrgRefCnt).await.unwrap();
        assert_eq!(counters, vec![(DocId::from("ORG1"), 4)]);
    }

    #[tokio::test]
    async fn test_reset_and_delete_zero_counter() {
        let store = seeded().await;
        assert_eq!(store.reset_counter(Counter::BgpPrefixRefCnt).await.unwrap(), 2);
        assert_eq!(
            store
                .delete_zero_counter(Counter::BgpPrefixRefCnt)
                .await
                .unwrap(),
            2
        );
        assert_eq!(store.count_documents(Collection::BgpPrefix).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_arrays_round_trip_canonical_ids() {
        let store = seeded().await;
        store
            .set_arrays(
                LinkArray::BgpPrefixAsns,
                &[(DocId::from("192.0.2.0/24"), vec![DocId::Int(64500)])],
            )
            .await
            .unwrap();
        let entries = store.array_entries(LinkArray::BgpPrefixAsns).await.unwrap();
        assert_eq!(
            entries,
            vec![
                (DocId::from("192.0.2.0/24"), vec![RefValue::Int(64500)]),
                (DocId::from("198.51.100.0/24"), vec![]),
            ]
        );
        assert_eq!(
            store
                .delete_empty_array(LinkArray::BgpPrefixAsns)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_fetch_with_wrong_key_kind_finds_nothing() {
        let store = seeded().await;
        let record = store
            .fetch(Collection::Asn, &DocId::from("64500"))
            .await
            .unwrap();
        assert!(record.is_none());
    }
}
