use parking_lot::Mutex;

/// Destinations advertisements are sent to.
///
/// The loopback and multicast entries are fixed and always come first; other
/// addresses keep their insertion order and appear once.
#[derive(Debug)]
pub struct AddressSet {
    fixed: Vec<String>,
    learned: Mutex<Vec<String>>,
}

impl AddressSet {
    pub fn new(loopback: impl Into<String>, multicast: impl Into<String>) -> Self {
        Self {
            fixed: vec![loopback.into(), multicast.into()],
            learned: Mutex::new(Vec::new()),
        }
    }

    /// Returns whether the address was new.
    pub fn add(&self, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() || self.is_fixed(address) {
            return false;
        }
        let mut learned = self.learned.lock();
        if learned.iter().any(|a| a.eq_ignore_ascii_case(address)) {
            return false;
        }
        learned.push(address.to_string());
        true
    }

    /// Returns how many addresses were new.
    pub fn add_all<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        addresses
            .into_iter()
            .filter(|a| self.add(a.as_ref()))
            .count()
    }

    /// Fixed entries cannot be removed; returns whether anything was.
    pub fn remove(&self, address: &str) -> bool {
        let address = address.trim();
        let mut learned = self.learned.lock();
        let before = learned.len();
        learned.retain(|a| !a.eq_ignore_ascii_case(address));
        learned.len() != before
    }

    pub fn contains(&self, address: &str) -> bool {
        let address = address.trim();
        self.is_fixed(address)
            || self
                .learned
                .lock()
                .iter()
                .any(|a| a.eq_ignore_ascii_case(address))
    }

    pub fn snapshot(&self) -> Vec<String> {
        let learned = self.learned.lock();
        self.fixed.iter().chain(learned.iter()).cloned().collect()
    }

    fn is_fixed(&self, address: &str) -> bool {
        self.fixed.iter().any(|a| a.eq_ignore_ascii_case(address))
    }
}
