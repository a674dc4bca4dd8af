use std::{collections::HashMap, fs, path::Path};

use hook_common::Pid;
use thiserror::Error;

/// ProcessTree contains information about all running processes
pub(crate) struct ProcessTree {
    processes: Vec<ProcessData>,
}

#[derive(Debug)]
pub(crate) struct ProcessData {
    pub(crate) pid: Pid,
    pub(crate) image: String,
    pub(crate) parent: Pid,
}

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("loading process {pid}: process not found")]
    ProcessNotFound { pid: Pid },
    #[error("loading process {pid}: parent image {ppid} not found")]
    ParentNotFound { pid: Pid, ppid: Pid },
    #[error("reading procfs entry {path}: {source}")]
    Procfs {
        path: String,
        source: std::io::Error,
    },
}

pub(crate) const PID_0: Pid = Pid::from_raw(0);

fn get_process_image(pid: Pid) -> Result<String, Error> {
    let path = format!("/proc/{pid}/exe");
    let exe = fs::read_link(&path).map_err(|source| Error::Procfs { path, source })?;
    Ok(exe.to_string_lossy().to_string())
}

/// Extract the parent pid from `/proc/<pid>/stat`. The command name in field
/// 2 can contain spaces and parentheses, so fields are located relative to
/// the closing parenthesis.
fn get_process_parent_pid(pid: Pid) -> Result<Pid, Error> {
    let path = format!("/proc/{pid}/stat");
    let stat = fs::read_to_string(&path).map_err(|source| Error::Procfs {
        path: path.clone(),
        source,
    })?;
    stat.rfind(')')
        .and_then(|end| stat.get(end + 2..))
        .and_then(|rest| rest.split(' ').nth(1))
        .and_then(|ppid| ppid.parse().ok())
        .map(Pid::from_raw)
        .ok_or(Error::Procfs {
            path,
            source: std::io::Error::other("unparsable stat line"),
        })
}

fn get_running_processes() -> Result<Vec<Pid>, Error> {
    let entries = fs::read_dir(Path::new("/proc")).map_err(|source| Error::Procfs {
        path: "/proc".to_string(),
        source,
    })?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_string_lossy().parse().ok())
        .map(Pid::from_raw)
        .collect())
}

impl ProcessTree {
    /// Construct the `ProcessTree` by reading from `procfs`:
    /// - process list
    /// - parent pid
    /// - image
    pub(crate) fn load_from_procfs() -> Result<Self, Error> {
        let mut processes = Vec::new();
        for pid in get_running_processes()? {
            let image = get_process_image(pid).unwrap_or_else(|err| {
                log::debug!("{}", err);
                String::new()
            });
            let parent = get_process_parent_pid(pid).unwrap_or_else(|err| {
                log::debug!("Error getting parent pid of {pid}: {}", err);
                Pid::from_raw(1)
            });
            processes.push(ProcessData { pid, image, parent });
        }
        Ok(Self::from_unsorted(processes))
    }

    /// Sort the given processes in parent-first order, starting from Pid 0,
    /// so a single pass can propagate tracking decisions to children.
    pub(crate) fn from_unsorted(process_list: Vec<ProcessData>) -> Self {
        let mut processes: HashMap<Pid, ProcessData> = HashMap::new();
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        let mut sorted_processes: Vec<ProcessData> = Vec::new();

        for process in process_list {
            if process.pid != PID_0 {
                children.entry(process.parent).or_default().push(process.pid);
            }
            processes.insert(process.pid, process);
        }

        // Pid 0 is part of the kernel and the root of the tree; make sure it
        // is present to avoid warnings about missing entries.
        processes.entry(PID_0).or_insert(ProcessData {
            pid: PID_0,
            image: String::from("kernel"),
            parent: PID_0,
        });

        let mut stack = vec![PID_0];
        while let Some(pid) = stack.pop() {
            let process = processes.remove(&pid).unwrap();
            sorted_processes.push(process);
            for child in children.remove(&pid).unwrap_or_default() {
                stack.push(child);
            }
        }
        if !processes.is_empty() {
            log::warn!("Found processes not starting from root: {:?}", processes);
            sorted_processes.extend(processes.into_values());
        }

        Self {
            processes: sorted_processes,
        }
    }

    /// Add a new entry and return its process info.
    /// This is needed to go from raw fork events to the full ProcessData
    /// needed by the policy filtering setup.
    pub(crate) fn fork(&mut self, pid: Pid, ppid: Pid) -> Result<&ProcessData, Error> {
        let parent = self.processes.iter().find(|p| p.pid == ppid);
        match parent {
            Some(parent) => {
                let image = parent.image.to_string();
                self.processes.push(ProcessData {
                    pid,
                    image,
                    parent: ppid,
                });
                Ok(self.processes.last().unwrap())
            }
            None => Err(Error::ParentNotFound { pid, ppid }),
        }
    }

    pub(crate) fn exec(&mut self, pid: Pid, image: &str) -> Result<&ProcessData, Error> {
        match self.processes.iter().position(|p| p.pid == pid) {
            Some(i) => {
                self.processes[i].image = image.to_string();
                Ok(&self.processes[i])
            }
            None => Err(Error::ProcessNotFound { pid }),
        }
    }
}

impl<'a> IntoIterator for &'a ProcessTree {
    type Item = &'a ProcessData;
    type IntoIter = std::slice::Iter<'a, ProcessData>;
    fn into_iter(self) -> Self::IntoIter {
        self.processes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_come_before_children() {
        let tree = ProcessTree::from_unsorted(vec![
            ProcessData {
                pid: Pid::from_raw(40),
                image: "/usr/bin/grandchild".to_string(),
                parent: Pid::from_raw(30),
            },
            ProcessData {
                pid: Pid::from_raw(30),
                image: "/usr/bin/child".to_string(),
                parent: Pid::from_raw(1),
            },
            ProcessData {
                pid: Pid::from_raw(1),
                image: "/sbin/init".to_string(),
                parent: PID_0,
            },
        ]);
        let order: Vec<i32> = tree.into_iter().map(|p| p.pid.as_raw()).collect();
        assert_eq!(order, vec![0, 1, 30, 40]);
    }

    #[test]
    fn fork_inherits_parent_image() {
        let mut tree = ProcessTree::from_unsorted(vec![ProcessData {
            pid: Pid::from_raw(1),
            image: "/sbin/init".to_string(),
            parent: PID_0,
        }]);
        let child = tree.fork(Pid::from_raw(2), Pid::from_raw(1)).unwrap();
        assert_eq!(child.image, "/sbin/init");
        assert!(tree.fork(Pid::from_raw(3), Pid::from_raw(99)).is_err());
    }
}
