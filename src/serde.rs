use std::marker::PhantomData;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::{Hash64, JumpMap};

impl<K, V, const LOCAL_GC_BUFFER_SIZE: usize> Serialize for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Serialize + Hash64 + Clone + Send + Sync,
    V: 'static + Serialize + Clone + Send + Sync,
{
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = s.serialize_map(None)?;
        for (k, v) in self.iter() {
            map.serialize_entry(&k, &v)?;
        }
        map.end()
    }
}

struct JumpMapVisitor<K, V, const LOCAL_GC_BUFFER_SIZE: usize> {
    pd: PhantomData<(K, V)>,
}

impl<'de, K, V, const LOCAL_GC_BUFFER_SIZE: usize> Visitor<'de>
    for JumpMapVisitor<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Deserialize<'de> + Hash64 + Clone + Send + Sync,
    V: 'static + Deserialize<'de> + Clone + Send + Sync,
{
    type Value = JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a map of jump-map entries")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let map = JumpMap::default();

        while let Some((key, value)) = access.next_entry()? {
            map.insert(key, value);
        }

        Ok(map)
    }
}

impl<'de, K, V, const LOCAL_GC_BUFFER_SIZE: usize> Deserialize<'de>
    for JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>
where
    K: 'static + Deserialize<'de> + Hash64 + Clone + Send + Sync,
    V: 'static + Deserialize<'de> + Clone + Send + Sync,
{
    fn deserialize<D>(d: D) -> Result<JumpMap<K, V, LOCAL_GC_BUFFER_SIZE>, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_map(JumpMapVisitor { pd: PhantomData })
    }
}
