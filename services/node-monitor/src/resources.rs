//! Detection of host resources, used for capacity and launcher-pool defaults.

use darter_proto::ResourceVector;

#[derive(Debug, Clone)]
pub struct SystemResources {
    pub cpu_cores: i32,
    pub total_memory_bytes: i64,
}

impl SystemResources {
    pub fn measure() -> Self {
        Self {
            cpu_cores: get_cpu_count(),
            total_memory_bytes: get_total_memory(),
        }
    }

    /// The default capacity vector advertised for this host.
    pub fn capacity(&self) -> ResourceVector {
        ResourceVector::new(self.total_memory_bytes, self.cpu_cores)
    }
}

fn get_cpu_count() -> i32 {
    #[cfg(unix)]
    {
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if count > 0 {
            return count as i32;
        }
    }

    std::thread::available_parallelism()
        .map(|p| p.get() as i32)
        .unwrap_or(1)
}

#[cfg(target_os = "linux")]
fn get_total_memory() -> i64 {
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        let total = parse_mem_total(&meminfo);
        if total > 0 {
            return total;
        }
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    if page_size > 0 && total_pages > 0 {
        return (page_size * total_pages) as i64;
    }

    16 * 1024 * 1024 * 1024
}

#[cfg(not(target_os = "linux"))]
fn get_total_memory() -> i64 {
    #[cfg(unix)]
    {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        if page_size > 0 && total_pages > 0 {
            return (page_size * total_pages) as i64;
        }
    }

    16 * 1024 * 1024 * 1024
}

#[cfg(target_os = "linux")]
fn parse_mem_total(content: &str) -> i64 {
    const KB_TO_BYTES: i64 = 1024;
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 && parts[0] == "MemTotal:" {
            return parts[1].parse::<i64>().unwrap_or(0) * KB_TO_BYTES;
        }
    }
    0
}
