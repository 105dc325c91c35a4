use std::str::FromStr;

// First representable millisecond of generated ids. Offsetting by a recent
// epoch keeps the high bit clear for decades, so ids compare identically
// whether they're read as signed or unsigned 64-bit integers.
const ID_EPOCH_MILLIS: u64 = 1_600_000_000_000;

const SEQ_BITS: u32 = 13;
const SHARD_BITS: u32 = 10;

/// Id is a 64-bit, time-ordered identifier of incidents, events, resources,
/// and test runs. It's rendered as 16 lowercase hex characters.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; 8]);

impl Id {
    pub fn new(b: [u8; 8]) -> Self {
        Self(b)
    }
    pub fn zero() -> Self {
        Self::new([0; 8])
    }
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }
    pub fn as_array(&self) -> [u8; 8] {
        self.0
    }

    /// Constructs a new `Id` from the given parts, or panics if a part is out of range.
    pub fn from_parts(timestamp: u64, seq: u16, shard: u16) -> Self {
        assert!(seq < (1 << SEQ_BITS), "sequence number out of range");
        assert!(shard < (1 << SHARD_BITS), "shard id out of range");
        let int_val =
            timestamp << (SEQ_BITS + SHARD_BITS) | (seq as u64) << SHARD_BITS | shard as u64;
        Self::new(int_val.to_be_bytes())
    }

    /// Returns a tuple of (timestamp, sequence number, shard id)
    pub fn into_parts(self) -> (u64, u16, u16) {
        const SEQ_MASK: u64 = (1u64 << SEQ_BITS) - 1;
        const SHARD_MASK: u64 = (1u64 << SHARD_BITS) - 1;

        let int_val = u64::from_be_bytes(self.0);
        let timestamp = int_val >> (SEQ_BITS + SHARD_BITS);

        let seq = ((int_val >> SHARD_BITS) & SEQ_MASK) as u16;
        let shard = (int_val & SHARD_MASK) as u16;
        (timestamp, seq, shard)
    }
}

impl FromStr for Id {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.replace(':', "");
        let u = u64::from_str_radix(&s, 16)?;
        Ok(Self(u.to_be_bytes()))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl serde::Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let str_val = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        Id::from_str(str_val.as_ref()).map_err(|err| D::Error::custom(format!("invalid id: {err}")))
    }
}

// Ids are stored in the `flowid` domain, which is a MACADDR8.
#[cfg(feature = "sqlx-support")]
mod sqlx_support {
    use super::Id;
    use sqlx::{postgres, Decode, Encode, Type, TypeInfo};

    impl Type<postgres::Postgres> for Id {
        fn type_info() -> postgres::PgTypeInfo {
            postgres::PgTypeInfo::with_name("flowid")
        }
        fn compatible(ty: &postgres::PgTypeInfo) -> bool {
            *ty == Self::type_info() || ty.name() == "MACADDR8"
        }
    }

    impl Encode<'_, postgres::Postgres> for Id {
        fn encode_by_ref(&self, buf: &mut postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
            buf.extend_from_slice(&self.0);
            sqlx::encode::IsNull::No
        }
    }

    // Binary format only: MACADDR8 is eight big-endian bytes, same as BIGINT.
    impl Decode<'_, postgres::Postgres> for Id {
        fn decode(value: postgres::PgValueRef<'_>) -> Result<Self, sqlx::error::BoxDynError> {
            <i64 as Decode<'_, postgres::Postgres>>::decode(value).map(|i| Self(i.to_be_bytes()))
        }
    }
}

/// Generates unique, monotonically increasing ids within a process.
/// Concurrent processes must use distinct shards.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    shard: u16,
    seq: u16,
    last_timestamp: u64,
}

impl IdGenerator {
    /// Return a new generator with the given shard id.
    pub fn new(shard: u16) -> Self {
        Self {
            shard,
            seq: 0,
            last_timestamp: 0,
        }
    }

    /// Generate and return the next unique id.
    pub fn next(&mut self) -> Id {
        let now_millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        // The wall clock may step backwards; ids must not.
        let mut timestamp = now_millis
            .saturating_sub(ID_EPOCH_MILLIS)
            .max(self.last_timestamp);

        if timestamp == self.last_timestamp {
            // Borrow from the next millisecond rather than overflow the sequence.
            if self.seq >= (1 << SEQ_BITS) - 1 {
                self.last_timestamp += 1;
                timestamp += 1;
                self.seq = 0;
            } else {
                self.seq += 1;
            }
        } else {
            self.seq = 0;
            self.last_timestamp = timestamp;
        }
        Id::from_parts(timestamp, self.seq, self.shard)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_ids_increase_and_decompose() {
        let mut gen = IdGenerator::new(321);

        let mut prev_id = gen.next();
        for i in 0..20000 {
            let id = gen.next();
            let (timestamp, seq, shard) = id.into_parts();
            assert_eq!(gen.shard, shard, "shard mismatch");
            assert_eq!(gen.last_timestamp, timestamp, "i: {i}, timestamp mismatch");
            assert!(id > prev_id, "i: {i}, prev: {prev_id}, next: {id}");
            assert_eq!(id, Id::from_parts(timestamp, seq, shard));
            prev_id = id;
        }
    }

    #[test]
    fn ids_parse_from_plain_and_colon_separated_hex() {
        let id = Id::from_str("0123456789abcdef").unwrap();
        assert_eq!(id.to_string(), "0123456789abcdef");
        assert_eq!(Id::from_str("01:23:45:67:89:ab:cd:ef").unwrap(), id);
        assert!(Id::from_str("not-hex").is_err());

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0123456789abcdef\"");
        assert_eq!(serde_json::from_str::<Id>(&json).unwrap(), id);
    }
}
