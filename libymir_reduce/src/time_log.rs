/// A single time stamped reading from a log. Times are nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry<T> {
    pub time: i64,
    pub value: T,
}

/// A log of readings, always sorted by time.
///
/// Entries sharing a time stamp keep the order they were given in.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeLog<T> {
    entries: Vec<LogEntry<T>>,
}

impl<T> Default for TimeLog<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> TimeLog<T> {
    pub fn new(mut entries: Vec<LogEntry<T>>) -> Self {
        entries.sort_by_key(|entry| entry.time);
        Self { entries }
    }

    /// Build a log from parallel time and value columns, as they are stored in an NXlog
    pub fn from_columns(times: Vec<i64>, values: Vec<T>) -> Self {
        Self::new(
            times
                .into_iter()
                .zip(values)
                .map(|(time, value)| LogEntry { time, value })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[LogEntry<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.iter().map(|entry| entry.time)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|entry| &entry.value)
    }
}

/// Number of sorted `times` in the half-open range `[start, end)`.
///
/// Edges are widened to i128 so `min - 1` and `max + 1` exist for any i64 time stamp.
fn count_in_range(times: &[i64], start: i128, end: i128) -> usize {
    let lower = times.partition_point(|t| i128::from(*t) < start);
    let upper = times.partition_point(|t| i128::from(*t) < end);
    upper.saturating_sub(lower)
}

/// Decide which log entry corresponds to each time bin.
///
/// A log value is valid from its own time stamp until the next log entry. The bin edges are
/// `[min(times) - 1, l_1, ..., l_m, max(times) + 1]` and the values are
/// `[out_of_range, v_1, ..., v_m]`, so bins before the first log entry get `out_of_range`.
///
/// `times` must be sorted. An empty `times` gives an empty result.
pub fn derive_log_coord_by_range<T: Clone>(
    times: &[i64],
    log: &TimeLog<T>,
    out_of_range: T,
) -> Vec<T> {
    let (Some(first), Some(last)) = (times.first(), times.last()) else {
        return Vec::new();
    };

    let mut edges: Vec<i128> = Vec::with_capacity(log.len() + 2);
    edges.push(i128::from(*first) - 1);
    edges.extend(log.times().map(i128::from));
    edges.push(i128::from(*last) + 1);

    let values = std::iter::once(&out_of_range).chain(log.values());

    let mut coord: Vec<T> = Vec::with_capacity(times.len());
    for (window, value) in edges.windows(2).zip(values) {
        let n_bins = count_in_range(times, window[0], window[1]);
        coord.extend(std::iter::repeat(value).take(n_bins).cloned());
    }
    coord
}
