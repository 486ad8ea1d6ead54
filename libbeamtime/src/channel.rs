//! Access to DOOCS control system channels.
//!
//! The network client itself is not part of this crate. Anything able to read a channel
//! record (and, for history channels, a time range) implements [`ChannelClient`]; the
//! train subscription and the history query are built on top of it.
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::error::{ChannelError, TrainFileError};
use super::train_file::TrainFileWriter;

/// Channel holding the facility train ID (macropulse number)
pub const TRAIN_ID_ADDRESS: &str = "FLASH.FEL/TIMER/EXP2/MACRO_PULSE_NUMBER";
/// Suffix of DOOCS history addresses
pub const HISTORY_SUFFIX: &str = ".HIST";
pub const DATA_KEY: &str = "data";
pub const MACROPULSE_KEY: &str = "macropulse";
/// Time between two polls while waiting for the next train (trains arrive at 10 Hz)
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One value of a channel record
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Int(i64),
    Float(f64),
    Text(String),
    Array(Array2<f64>),
}

impl ChannelValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

/// A record returned by a channel read: named values, at least `data` and `macropulse`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRecord {
    pub fields: BTreeMap<String, ChannelValue>,
}

impl ChannelRecord {
    pub fn get(&self, key: &str) -> Option<&ChannelValue> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn macropulse(&self) -> Option<i64> {
        self.get(MACROPULSE_KEY).and_then(|v| v.as_i64())
    }
}

/// A client able to talk to the control system
pub trait ChannelClient {
    /// Read the current record of a channel
    fn read(&self, address: &str) -> Result<ChannelRecord, ChannelError>;

    /// Read (unix timestamp, value) pairs of a history channel between two unix times
    fn read_history(
        &self,
        address: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(f64, f64)>, ChannelError>;
}

/// The current train ID of the facility
pub fn current_train_id<C: ChannelClient>(client: &C) -> Result<i64, ChannelError> {
    client
        .read(TRAIN_ID_ADDRESS)?
        .get(DATA_KEY)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| {
            ChannelError::MissingKey(TRAIN_ID_ADDRESS.to_string(), DATA_KEY.to_string())
        })
}

fn check_keys(address: &str, record: &ChannelRecord, keys: &[&str]) -> Result<(), ChannelError> {
    for key in keys {
        if record.get(key).is_none() {
            return Err(ChannelError::MissingKey(address.to_string(), key.to_string()));
        }
    }
    Ok(())
}

/// Subscription to a channel, delivering one record per train
#[derive(Debug)]
pub struct TrainAbo<'a, C: ChannelClient> {
    client: &'a C,
    address: String,
    train_id: i64,
    poll_interval: Duration,
}

impl<'a, C: ChannelClient> TrainAbo<'a, C> {
    pub fn new(client: &'a C, address: &str) -> Self {
        Self {
            client,
            address: address.to_string(),
            train_id: 0,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Keys available in a record of this channel
    pub fn channel_keys(&self) -> Result<Vec<String>, ChannelError> {
        Ok(self.client.read(&self.address)?.keys().cloned().collect())
    }

    /// Iterate over `count` unique trains. None loops until the process is stopped.
    pub fn trains(&mut self, count: Option<usize>) -> Trains<'_, 'a, C> {
        Trains {
            abo: self,
            remaining: count,
        }
    }

    fn next_train(&mut self) -> Result<ChannelRecord, ChannelError> {
        loop {
            let record = self.client.read(&self.address)?;
            check_keys(&self.address, &record, &[DATA_KEY, MACROPULSE_KEY])?;
            let current_id = record.macropulse().ok_or_else(|| {
                ChannelError::MissingKey(self.address.clone(), MACROPULSE_KEY.to_string())
            })?;
            if current_id == 0 {
                return Err(ChannelError::ZeroMacropulse(self.address.clone()));
            }
            if current_id != self.train_id {
                self.train_id = current_id;
                return Ok(record);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Record `number_of_trains` trains of the given keys into a new HDF5 file
    pub fn to_hdf(
        &mut self,
        path: &Path,
        keys: &[&str],
        number_of_trains: usize,
    ) -> Result<(), TrainFileError> {
        if path.exists() {
            return Err(TrainFileError::FileExists(path.to_path_buf()));
        }
        if number_of_trains == 0 {
            return Err(TrainFileError::NoTrains);
        }
        if keys.is_empty() {
            return Err(TrainFileError::NoKeys);
        }
        let template = self.client.read(&self.address)?;
        check_keys(&self.address, &template, keys)?;

        let mut writer = TrainFileWriter::new(path, &template, keys, number_of_trains)?;
        for record in self.trains(Some(number_of_trains)) {
            writer.write_train(&record?)?;
        }
        writer.close();
        log::info!("Done - Writing {number_of_trains} trains to HDF5.");
        Ok(())
    }
}

/// Iterator returned by [`TrainAbo::trains`]
pub struct Trains<'b, 'a, C: ChannelClient> {
    abo: &'b mut TrainAbo<'a, C>,
    remaining: Option<usize>,
}

impl<C: ChannelClient> Iterator for Trains<'_, '_, C> {
    type Item = Result<ChannelRecord, ChannelError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.remaining {
            Some(0) => return None,
            Some(n) => self.remaining = Some(n - 1),
            None => (),
        }
        match self.abo.next_train() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                // A failed read ends the subscription
                self.remaining = Some(0);
                Some(Err(e))
            }
        }
    }
}

/// Query of a DOOCS history channel
#[derive(Debug, Clone)]
pub struct DoocsHistory {
    address: String,
    offset: UtcOffset,
}

impl DoocsHistory {
    /// Times are interpreted as UTC
    pub fn new(address: &str) -> Result<Self, ChannelError> {
        Self::with_offset(address, UtcOffset::UTC)
    }

    /// Times are interpreted in the given offset (the control system local time)
    pub fn with_offset(address: &str, offset: UtcOffset) -> Result<Self, ChannelError> {
        if !address.ends_with(HISTORY_SUFFIX) {
            return Err(ChannelError::NotHistoryAddress(address.to_string()));
        }
        Ok(Self {
            address: address.to_string(),
            offset,
        })
    }

    /// Convert `YYYY-MM-DD HH:MM:SS` into a unix timestamp
    pub fn time_to_timestamp(&self, time_str: &str) -> Result<i64, ChannelError> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let time = PrimitiveDateTime::parse(time_str.trim(), &format)
            .map_err(|_| ChannelError::BadTimeString(time_str.to_string()))?;
        Ok(time.assume_offset(self.offset).unix_timestamp())
    }

    /// Times and values of the channel between `start_time` and `stop_time`
    pub fn get_history<C: ChannelClient>(
        &self,
        client: &C,
        start_time: &str,
        stop_time: &str,
    ) -> Result<(Vec<OffsetDateTime>, Vec<f64>), ChannelError> {
        let start = self.time_to_timestamp(start_time)?;
        let stop = self.time_to_timestamp(stop_time)?;
        let history = client.read_history(&self.address, start, stop)?;
        if history.is_empty() {
            return Err(ChannelError::EmptyHistory(self.address.clone()));
        }
        let mut times = Vec::with_capacity(history.len());
        let mut values = Vec::with_capacity(history.len());
        for (timestamp, value) in history {
            let time = OffsetDateTime::from_unix_timestamp_nanos((timestamp * 1.0e9) as i128)
                .map_err(|e| ChannelError::ClientError(e.to_string()))?
                .to_offset(self.offset);
            times.push(time);
            values.push(value);
        }
        Ok((times, values))
    }
}

/// A scripted client used by the unit tests of this crate
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Returns the scripted macropulses in order; the last one repeats forever
    pub struct MockClient {
        pub pulses: RefCell<VecDeque<i64>>,
        pub reads: RefCell<usize>,
    }

    impl MockClient {
        pub fn new(pulses: &[i64]) -> Self {
            Self {
                pulses: RefCell::new(pulses.iter().copied().collect()),
                reads: RefCell::new(0),
            }
        }
    }

    impl ChannelClient for MockClient {
        fn read(&self, address: &str) -> Result<ChannelRecord, ChannelError> {
            *self.reads.borrow_mut() += 1;
            let mut pulses = self.pulses.borrow_mut();
            let pulse = if pulses.len() > 1 {
                pulses.pop_front().unwrap_or(0)
            } else {
                pulses.front().copied().unwrap_or(0)
            };
            let mut fields = BTreeMap::new();
            if address == TRAIN_ID_ADDRESS {
                fields.insert(DATA_KEY.to_string(), ChannelValue::Int(pulse));
            } else {
                fields.insert(
                    DATA_KEY.to_string(),
                    ChannelValue::Array(Array2::from_elem((2, 3), pulse as f64)),
                );
                fields.insert(MACROPULSE_KEY.to_string(), ChannelValue::Int(pulse));
                fields.insert("timestamp".to_string(), ChannelValue::Float(pulse as f64 / 10.0));
                fields.insert("type".to_string(), ChannelValue::Text("SPECTRUM".to_string()));
            }
            Ok(ChannelRecord { fields })
        }

        fn read_history(
            &self,
            _address: &str,
            start: i64,
            stop: i64,
        ) -> Result<Vec<(f64, f64)>, ChannelError> {
            Ok((start..stop)
                .step_by(3600)
                .map(|t| (t as f64, (t - start) as f64))
                .collect())
        }
    }
}
