//! Periodic MBean snapshots.
//!
//! Every bean field of every component is forwarded to live monitoring as
//! `<name>-<num>*<bean>+<field>` and, when the run writes monitoring files,
//! appended to `<run_dir>/<name>-<num>.moni`.

use super::task::{CnCTask, TaskContext, TaskControl};
use crate::component::{BeanError, ComponentProxy};
use crate::log_warn;
use crate::moni::Priority;
use crate::value::BeanValue;
use chrono::Local;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

pub const NAME: &str = "Monitoring";

type Snapshot = Vec<(String, BTreeMap<String, BeanValue>)>;

pub struct MonitorTask {
    period: Duration,
}

impl MonitorTask {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Reads every bean of `comp`.
    fn snapshot(comp: &ComponentProxy) -> Result<Snapshot, BeanError> {
        let mut beans = Vec::new();
        for bean in comp.bean_names()? {
            let fields = comp.get_bean(&bean)?;
            beans.push((bean, fields));
        }
        Ok(beans)
    }

    fn send_live(ctx: &TaskContext, comp: &ComponentProxy, snapshot: &Snapshot) {
        let prefix = comp.name().file_name();
        for (bean, fields) in snapshot {
            for (field, value) in fields {
                let key = format!("{}*{}+{}", prefix, bean, field);
                ctx.send_moni(&key, value.clone(), Priority::Its);
            }
        }
    }

    fn write_file(run_dir: &Path, comp: &ComponentProxy, snapshot: &Snapshot) -> io::Result<()> {
        let path = run_dir.join(format!("{}.moni", comp.name().file_name()));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        for (bean, fields) in snapshot {
            writeln!(file, "{}: {}:", bean, stamp)?;
            for (field, value) in fields {
                writeln!(file, "\t{}: {}", field, value)?;
            }
            writeln!(file)?;
        }
        Ok(())
    }
}

impl CnCTask for MonitorTask {
    fn name(&self) -> &'static str {
        NAME
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn check(&mut self, ctx: &TaskContext) -> TaskControl {
        let to_live = ctx.moni_target.to_live() && ctx.has_moni();
        let run_dir = ctx
            .run_dir
            .as_deref()
            .filter(|_| ctx.moni_target.to_file());

        for comp in &ctx.components {
            let snapshot = match Self::snapshot(comp) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    log_warn!(ctx.dashlog, "Cannot get {} bean data: {}", comp.name(), e);
                    continue;
                }
            };
            if to_live {
                Self::send_live(ctx, comp, &snapshot);
            }
            if let Some(dir) = run_dir {
                if let Err(e) = Self::write_file(dir, comp, &snapshot) {
                    log_warn!(
                        ctx.dashlog,
                        "Cannot write {} monitoring file: {}",
                        comp.name(),
                        e
                    );
                }
            }
        }
        TaskControl::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{Logger, MemoryLogger};
    use crate::moni::{MoniSink, MoniTarget};
    use crate::testing::{MockComponent, RecordingMoniSink};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_fields_go_to_live_with_component_keys() {
        let hub = Arc::new(MockComponent::new("stringHub", 21));
        let eb = Arc::new(MockComponent::new("eventBuilder", 0));
        eb.set_bean_field("backEnd", "DiskAvailable", BeanValue::Int(2560));
        let sink = Arc::new(RecordingMoniSink::new());
        let ctx = TaskContext::new(
            vec![Arc::new(hub.proxy()), Arc::new(eb.proxy())],
            Arc::new(MemoryLogger::new()),
        )
        .with_moni(sink.clone() as Arc<dyn MoniSink>, MoniTarget::Live);

        MonitorTask::new(Duration::from_secs(100)).check(&ctx);

        let rec = sink.last("eventBuilder-0*backEnd+DiskAvailable").unwrap();
        assert_eq!(rec.value, BeanValue::Int(2560));
        assert_eq!(rec.priority, Priority::Its);
        assert!(sink.contains("stringHub-21*stringhub+NumberOfActiveAndTotalChannels"));
        assert!(sink.contains("stringHub-21*sender+NumHitsReceived"));
    }

    #[test]
    fn test_file_target_writes_moni_files() {
        let dir = TempDir::new().unwrap();
        let eb = Arc::new(MockComponent::new("eventBuilder", 0));
        let sink = Arc::new(RecordingMoniSink::new());
        let ctx = TaskContext::new(vec![Arc::new(eb.proxy())], Arc::new(MemoryLogger::new()))
            .with_moni(sink.clone() as Arc<dyn MoniSink>, MoniTarget::File)
            .with_run_dir(Some(dir.path().to_path_buf()));

        MonitorTask::new(Duration::from_secs(100)).check(&ctx);

        let text = std::fs::read_to_string(dir.path().join("eventBuilder-0.moni")).unwrap();
        assert!(text.starts_with("backEnd: "));
        assert!(text.contains("\tDiskAvailable: 2048\n"));
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_unreachable_component_is_skipped() {
        let eb = Arc::new(MockComponent::new("eventBuilder", 0));
        let proxy = eb.proxy();
        eb.set_unreachable(true);
        let dashlog = Arc::new(MemoryLogger::new());
        let sink = Arc::new(RecordingMoniSink::new());
        let ctx = TaskContext::new(vec![Arc::new(proxy)], dashlog.clone() as Arc<dyn Logger>)
            .with_moni(sink.clone() as Arc<dyn MoniSink>, MoniTarget::Live);

        assert_eq!(
            MonitorTask::new(Duration::from_secs(100)).check(&ctx),
            TaskControl::Continue
        );
        assert!(dashlog.contains_fragment("Cannot get eventBuilder bean data"));
        assert!(sink.records().is_empty());
    }
}
