//! Component identity.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// `(name, instance number)` pair identifying a component within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentName {
    name: String,
    num: u32,
}

impl ComponentName {
    pub fn new(name: impl Into<String>, num: u32) -> Self {
        Self {
            name: name.into(),
            num,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    /// Display name: `name#num`, with `#0` elided for anything but hubs.
    pub fn full_name(&self) -> String {
        if self.num == 0 && !self.name.to_lowercase().ends_with("hub") {
            return self.name.clone();
        }
        format!("{}#{}", self.name, self.num)
    }

    /// Name used for per-component files: `name-num`.
    pub fn file_name(&self) -> String {
        format!("{}-{}", self.name, self.num)
    }

    pub fn is_hub(&self) -> bool {
        self.name.ends_with("Hub")
    }

    pub fn is_replay_hub(&self) -> bool {
        self.is_hub() && self.name.to_lowercase().contains("replay")
    }

    /// Event builders and the secondary builders.
    pub fn is_builder(&self) -> bool {
        self.name.to_lowercase().contains("builder")
    }

    /// Trigger components (`inIceTrigger`, `globalTrigger`, ...).
    pub fn is_trigger(&self) -> bool {
        self.name.to_lowercase().ends_with("trigger")
    }

    /// True for `name` with any number if `num` is `None`.
    pub fn is(&self, name: &str, num: Option<u32>) -> bool {
        self.name == name && num.map_or(true, |n| n == self.num)
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl FromStr for ComponentName {
    type Err = String;

    /// Parses `name`, `name#num` or `name-num`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty component name".to_string());
        }
        let split = s.rfind('#').or_else(|| s.rfind('-'));
        match split {
            Some(idx) => {
                let (name, num) = (&s[..idx], &s[idx + 1..]);
                let num = num
                    .parse()
                    .map_err(|_| format!("bad instance number in '{}'", s))?;
                if name.is_empty() {
                    return Err(format!("missing name in '{}'", s));
                }
                Ok(Self::new(name, num))
            }
            None => Ok(Self::new(s, 0)),
        }
    }
}

/// Collapses a set of names into a compact listing such as
/// `stringHub#1-3,5 eventBuilder`.
pub fn list_component_ranges<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a ComponentName>,
{
    let mut grouped: Vec<(String, Vec<u32>)> = Vec::new();
    for name in names {
        match grouped.iter_mut().find(|(n, _)| n == name.name()) {
            Some((_, nums)) => nums.push(name.num()),
            None => grouped.push((name.name().to_string(), vec![name.num()])),
        }
    }

    let mut parts = Vec::with_capacity(grouped.len());
    for (name, mut nums) in grouped {
        nums.sort_unstable();
        nums.dedup();
        if nums == [0] && !name.to_lowercase().ends_with("hub") {
            parts.push(name);
            continue;
        }

        let mut ranges = Vec::new();
        let mut start = nums[0];
        let mut prev = nums[0];
        for &n in &nums[1..] {
            if n == prev + 1 {
                prev = n;
                continue;
            }
            ranges.push(format_range(start, prev));
            start = n;
            prev = n;
        }
        ranges.push(format_range(start, prev));
        parts.push(format!("{}#{}", name, ranges.join(",")));
    }
    parts.join(" ")
}

fn format_range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_elides_zero_for_non_hubs() {
        assert_eq!(ComponentName::new("eventBuilder", 0).full_name(), "eventBuilder");
        assert_eq!(ComponentName::new("stringHub", 0).full_name(), "stringHub#0");
        assert_eq!(ComponentName::new("stringHub", 21).full_name(), "stringHub#21");
        assert_eq!(ComponentName::new("stringHub", 21).file_name(), "stringHub-21");
    }

    #[test]
    fn test_roles() {
        assert!(ComponentName::new("stringHub", 1).is_hub());
        assert!(ComponentName::new("replayHub", 1).is_replay_hub());
        assert!(!ComponentName::new("stringHub", 1).is_replay_hub());
        assert!(ComponentName::new("eventBuilder", 0).is_builder());
        assert!(ComponentName::new("secondaryBuilders", 0).is_builder());
        assert!(ComponentName::new("inIceTrigger", 0).is_trigger());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "stringHub#21".parse::<ComponentName>().unwrap(),
            ComponentName::new("stringHub", 21)
        );
        assert_eq!(
            "stringHub-6".parse::<ComponentName>().unwrap(),
            ComponentName::new("stringHub", 6)
        );
        assert_eq!(
            "eventBuilder".parse::<ComponentName>().unwrap(),
            ComponentName::new("eventBuilder", 0)
        );
        assert!("#3".parse::<ComponentName>().is_err());
        assert!("hub#x".parse::<ComponentName>().is_err());
    }

    #[test]
    fn test_list_component_ranges() {
        let names = vec![
            ComponentName::new("stringHub", 3),
            ComponentName::new("stringHub", 1),
            ComponentName::new("stringHub", 2),
            ComponentName::new("stringHub", 5),
            ComponentName::new("eventBuilder", 0),
        ];
        assert_eq!(list_component_ranges(&names), "stringHub#1-3,5 eventBuilder");
    }
}
