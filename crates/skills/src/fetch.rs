use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use {
    tracing::{debug, info, warn},
    walkdir::WalkDir,
};

use crate::{
    error::{Error, Result},
    marketplace::{Marketplace, MarketplaceLocation, MarketplaceSkill},
    parse::{dir_name, read_metadata},
    types::SKILL_FILENAME,
};

/// Upper bound for a single `git clone`.
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Produces a shallow checkout of a remote repository.
pub trait RepoCloner: Send + Sync {
    /// Clone `url` into `dest`. `dest` does not exist when this is called.
    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Clones with the `git` binary found in `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            timeout: CLONE_TIMEOUT,
        }
    }
}

impl GitCli {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RepoCloner for GitCli {
    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<()> {
        info!(url, dest = %dest.display(), "cloning marketplace");
        let spawned = Command::new("git")
            .args(["clone", "--depth", "1", "--quiet"])
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::fetch(format!(
                    "git is not installed or not in PATH (needed to clone {url})"
                )));
            },
            Err(e) => return Err(Error::fetch(format!("failed to clone {url}: {e}"))),
        };

        // Drained off-thread so a chatty git cannot block on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::fetch(format!(
                        "git clone timed out after {}s for {url}",
                        self.timeout.as_secs()
                    )));
                },
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(Error::fetch(format!("failed to clone {url}: {e}")));
                },
            }
        };

        if !status.success() {
            let stderr = stderr
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default();
            return Err(Error::fetch(format!(
                "git clone failed for {url}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// A `SKILL.md` whose frontmatter could not be read during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub skills: Vec<MarketplaceSkill>,
    pub failures: Vec<ScanFailure>,
}

/// Retrieves marketplace metadata and copies skills out of marketplaces.
///
/// Remote marketplaces are cloned into `<cache_dir>/<name>` with `/` and `\`
/// in the name replaced by `_`. Every fetch replaces the previous clone.
pub struct MarketplaceFetcher {
    cache_dir: PathBuf,
    cloner: Box<dyn RepoCloner>,
}

impl MarketplaceFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_cloner(cache_dir, GitCli::default())
    }

    pub fn with_cloner(cache_dir: impl Into<PathBuf>, cloner: impl RepoCloner + 'static) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            cloner: Box::new(cloner),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, marketplace_name: &str) -> PathBuf {
        self.cache_dir.join(cache_dir_name(marketplace_name))
    }

    /// Scan a marketplace for skills, cloning it first when it is remote.
    ///
    /// On a successful clone `marketplace.checkout` points at the new copy.
    pub fn fetch_metadata(&self, marketplace: &mut Marketplace) -> Result<ScanReport> {
        let root = match &marketplace.location {
            MarketplaceLocation::Local { path } => {
                if !path.exists() {
                    return Err(Error::fetch(format!(
                        "local marketplace path does not exist: {}",
                        path.display()
                    )));
                }
                if !path.is_dir() {
                    return Err(Error::fetch(format!(
                        "local marketplace path is not a directory: {}",
                        path.display()
                    )));
                }
                path.clone()
            },
            MarketplaceLocation::Github { remote_url } | MarketplaceLocation::GitUrl { remote_url } => {
                if remote_url.trim().is_empty() {
                    return Err(Error::fetch(format!(
                        "marketplace '{}' has no remote URL",
                        marketplace.name
                    )));
                }
                let url = remote_url.clone();
                let dest = self.refresh_checkout(&marketplace.name, &url)?;
                marketplace.checkout = Some(dest.clone());
                dest
            },
        };

        Ok(self.scan(&root, marketplace))
    }

    fn refresh_checkout(&self, name: &str, url: &str) -> Result<PathBuf> {
        // The old checkout is deleted below, so it must sit directly in the cache.
        let dest = self.cache_path(name);
        if !is_safe_dir_name(&cache_dir_name(name)) || dest.parent() != Some(self.cache_dir.as_path()) {
            return Err(Error::fetch(format!(
                "refusing to clone marketplace '{name}': its name does not map to a cache directory"
            )));
        }
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| Error::io(&self.cache_dir, e))?;
        if dest.exists() {
            std::fs::remove_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
        }
        self.cloner.clone_shallow(url, &dest)?;
        Ok(dest)
    }

    /// Read the frontmatter of every `SKILL.md` under `root`.
    pub fn scan(&self, root: &Path, marketplace: &Marketplace) -> ScanReport {
        let mut report = ScanReport::default();

        for skill_md in skill_files(root) {
            let skill_dir = skill_md.parent().unwrap_or(root);
            match read_metadata(&skill_md) {
                Ok(meta) => {
                    let relative = skill_dir.strip_prefix(root).unwrap_or(Path::new(""));
                    let skill = MarketplaceSkill {
                        name: meta.name.unwrap_or_else(|| dir_name(skill_dir)),
                        description: meta.description.unwrap_or_default(),
                        source: marketplace.breadcrumb(relative),
                        version: meta.version,
                    };
                    debug!(name = %skill.name, path = %skill_dir.display(), "found skill");
                    report.skills.push(skill);
                },
                Err(e) => {
                    warn!(path = %skill_dir.display(), error = %e, "failed to read skill metadata, skipping");
                    report.failures.push(ScanFailure {
                        path: skill_dir.to_path_buf(),
                        reason: e.to_string(),
                    });
                },
            }
        }

        info!(
            marketplace = %marketplace.name,
            count = report.skills.len(),
            failed = report.failures.len(),
            "scanned marketplace"
        );
        report
    }

    /// Copy one skill into `destination/<skill name>`, replacing any previous
    /// copy. Fetches the marketplace first when it has no files on disk yet.
    pub fn download_skill(
        &self,
        marketplace: &mut Marketplace,
        skill: &MarketplaceSkill,
        destination: &Path,
    ) -> Result<PathBuf> {
        if !is_safe_dir_name(&skill.name) {
            return Err(Error::fetch(format!(
                "refusing to install skill with unsafe name '{}'",
                skill.name
            )));
        }

        if !marketplace.local_path().is_some_and(Path::is_dir) {
            self.fetch_metadata(marketplace)?;
        }
        let root = marketplace
            .local_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                Error::fetch(format!(
                    "marketplace '{}' has no local path after fetch",
                    marketplace.name
                ))
            })?;

        let source_dir = locate_skill(&root, &skill.name).ok_or_else(|| {
            Error::fetch(format!(
                "could not find skill '{}' in marketplace '{}'",
                skill.name, marketplace.name
            ))
        })?;

        std::fs::create_dir_all(destination).map_err(|e| Error::io(destination, e))?;
        let target = destination.join(&skill.name);
        if target.symlink_metadata().is_ok() {
            remove_path(&target)?;
        }
        copy_dir(&source_dir, &target)?;

        info!(skill = %skill.name, target = %target.display(), "downloaded skill");
        Ok(target)
    }

    /// Delete every cached clone. Returns whether anything was removed.
    pub fn clear_cache(&self) -> Result<bool> {
        if !self.cache_dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.cache_dir).map_err(|e| Error::io(&self.cache_dir, e))?;
        info!(path = %self.cache_dir.display(), "cleared marketplace cache");
        Ok(true)
    }
}

/// Every `SKILL.md` under `root` in file-name order, skipping `.git`.
fn skill_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                None
            },
        })
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == SKILL_FILENAME)
        .map(walkdir::DirEntry::into_path)
}

/// Directory of the first skill under `root` whose resolved name is `name`.
fn locate_skill(root: &Path, name: &str) -> Option<PathBuf> {
    skill_files(root).find_map(|skill_md| {
        let skill_dir = skill_md.parent()?.to_path_buf();
        let resolved = match read_metadata(&skill_md) {
            Ok(meta) => meta.name.unwrap_or_else(|| dir_name(&skill_dir)),
            Err(_) => dir_name(&skill_dir),
        };
        (resolved == name).then_some(skill_dir)
    })
}

fn cache_dir_name(marketplace_name: &str) -> String {
    marketplace_name.replace(['/', '\\'], "_")
}

fn is_safe_dir_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn remove_path(path: &Path) -> Result<()> {
    let removed = if path.is_dir() && !path.is_symlink() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| Error::io(path, e))
}

/// Recursively copy `src` to `dest`. Symlinks are not followed or copied.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| Error::io(src, e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| Error::io(entry.path(), e))?;
        } else {
            debug!(path = %entry.path().display(), "skipping symlink");
        }
    }

    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::ErrorKind, marketplace::parse_source_in},
        std::sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Clones by copying a fixture directory.
    struct FixtureCloner {
        fixture: PathBuf,
        calls: Arc<AtomicUsize>,
    }

    impl RepoCloner for FixtureCloner {
        fn clone_shallow(&self, _url: &str, dest: &Path) -> Result<()> {
            assert!(!dest.exists());
            self.calls.fetch_add(1, Ordering::SeqCst);
            copy_dir(&self.fixture, dest)
        }
    }

    struct FailingCloner;

    impl RepoCloner for FailingCloner {
        fn clone_shallow(&self, url: &str, _dest: &Path) -> Result<()> {
            Err(Error::fetch(format!("git clone failed for {url}: boom")))
        }
    }

    fn write_skill(root: &Path, rel: &str, content: &str) {
        let dir = root.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SKILL_FILENAME), content).unwrap();
    }

    fn local(path: &Path) -> Marketplace {
        Marketplace::new(parse_source_in(path.to_str().unwrap(), Path::new("/")).unwrap())
    }

    #[test]
    fn scans_local_marketplace() {
        let tmp = tempfile::tempdir().unwrap();
        let market_dir = tmp.path().join("market");
        write_skill(&market_dir, "greeting", "---\nname: greeting\ndescription: Welcome users\nversion: 1.0\n---\n# Greeting\n");
        write_skill(&market_dir, "nested/no-frontmatter", "# Only a body\n");
        write_skill(&market_dir, "broken", "---\nname: [oops\n---\n");
        write_skill(&market_dir, ".git/hooks", "---\nname: hidden\n---\n");

        let fetcher = MarketplaceFetcher::with_cloner(tmp.path().join("cache"), FailingCloner);
        let mut market = local(&market_dir);
        let report = fetcher.fetch_metadata(&mut market).unwrap();

        let names: Vec<_> = report.skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["greeting", "no-frontmatter"]);
        assert_eq!(report.skills[0].source, "local:market/greeting");
        assert_eq!(report.skills[0].version.as_deref(), Some("1.0"));
        assert_eq!(report.skills[1].source, "local:market/nested/no-frontmatter");
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken"));
        assert!(market.checkout.is_none());
    }

    #[test]
    fn skill_at_marketplace_root() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "solo", "---\nname: solo\n---\n");
        let fetcher = MarketplaceFetcher::new(tmp.path().join("cache"));
        let mut market = local(&tmp.path().join("solo"));

        let report = fetcher.fetch_metadata(&mut market).unwrap();
        assert_eq!(report.skills[0].source, "local:solo");
    }

    #[rstest::rstest]
    #[case::missing(false)]
    #[case::file(true)]
    fn bad_local_paths_are_fetch_errors(#[case] create_file: bool) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("market");
        if create_file {
            std::fs::write(&path, "not a dir").unwrap();
        }
        let fetcher = MarketplaceFetcher::new(tmp.path().join("cache"));
        let err = fetcher.fetch_metadata(&mut local(&path)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn remote_fetch_replaces_previous_clone() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = tmp.path().join("fixture");
        write_skill(&fixture, "skills/greeting", "---\nname: greeting\n---\n");

        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = MarketplaceFetcher::with_cloner(tmp.path().join("cache"), FixtureCloner {
            fixture,
            calls: Arc::clone(&calls),
        });
        let mut market =
            Marketplace::new(parse_source_in("acme/skills", Path::new("/")).unwrap());

        let report = fetcher.fetch_metadata(&mut market).unwrap();
        let checkout = tmp.path().join("cache").join("acme_skills");
        assert_eq!(market.checkout.as_deref(), Some(checkout.as_path()));
        assert_eq!(report.skills[0].source, "github:acme/skills/skills/greeting");

        std::fs::write(checkout.join("stale.txt"), "old").unwrap();
        fetcher.fetch_metadata(&mut market).unwrap();
        assert!(!checkout.join("stale.txt").exists());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clone_failure_names_the_url() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = MarketplaceFetcher::with_cloner(tmp.path().join("cache"), FailingCloner);
        let mut market = Marketplace::new(
            parse_source_in("https://example.com/team/skills.git", Path::new("/")).unwrap(),
        );

        let err = fetcher.fetch_metadata(&mut market).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains("https://example.com/team/skills.git"));
        assert!(market.checkout.is_none());
    }

    #[test]
    fn download_replaces_existing_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let market_dir = tmp.path().join("market");
        write_skill(&market_dir, "dir-name-differs", "---\nname: greeting\n---\n# Greeting\n");
        std::fs::create_dir_all(market_dir.join("dir-name-differs/assets")).unwrap();
        std::fs::write(market_dir.join("dir-name-differs/assets/logo.txt"), "logo").unwrap();

        let fetcher = MarketplaceFetcher::new(tmp.path().join("cache"));
        let mut market = local(&market_dir);
        let skill = fetcher.fetch_metadata(&mut market).unwrap().skills.remove(0);

        let dest = tmp.path().join("project/skills");
        std::fs::create_dir_all(dest.join("greeting")).unwrap();
        std::fs::write(dest.join("greeting/leftover.md"), "old").unwrap();

        let target = fetcher.download_skill(&mut market, &skill, &dest).unwrap();
        assert_eq!(target, dest.join("greeting"));
        assert!(target.join(SKILL_FILENAME).is_file());
        assert_eq!(std::fs::read_to_string(target.join("assets/logo.txt")).unwrap(), "logo");
        assert!(!target.join("leftover.md").exists());
    }

    #[test]
    fn download_clones_when_no_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = tmp.path().join("fixture");
        write_skill(&fixture, "greeting", "---\nname: greeting\n---\n");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = MarketplaceFetcher::with_cloner(tmp.path().join("cache"), FixtureCloner {
            fixture,
            calls: Arc::clone(&calls),
        });
        let mut market =
            Marketplace::new(parse_source_in("acme/skills", Path::new("/")).unwrap());
        let skill = MarketplaceSkill {
            name: "greeting".into(),
            description: String::new(),
            source: "github:acme/skills/greeting".into(),
            version: None,
        };

        let target = fetcher
            .download_skill(&mut market, &skill, &tmp.path().join("dest"))
            .unwrap();
        assert!(target.join(SKILL_FILENAME).is_file());
        assert!(market.checkout.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn download_unknown_skill_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let market_dir = tmp.path().join("market");
        write_skill(&market_dir, "greeting", "---\nname: greeting\n---\n");
        let fetcher = MarketplaceFetcher::new(tmp.path().join("cache"));
        let mut market = local(&market_dir);
        let ghost = MarketplaceSkill {
            name: "ghost".into(),
            description: String::new(),
            source: "local:market/ghost".into(),
            version: None,
        };

        let err = fetcher
            .download_skill(&mut market, &ghost, &tmp.path().join("dest"))
            .unwrap_err();
        assert!(err.to_string().contains("could not find skill 'ghost'"));

        let sneaky = MarketplaceSkill {
            name: "../escape".into(),
            ..ghost
        };
        assert!(fetcher
            .download_skill(&mut market, &sneaky, &tmp.path().join("dest"))
            .is_err());
    }

    #[test]
    fn cache_path_sanitizes_separators() {
        let fetcher = MarketplaceFetcher::new("/home/dev/.skillforge/cache");
        assert_eq!(
            fetcher.cache_path("owner/repo"),
            PathBuf::from("/home/dev/.skillforge/cache/owner_repo")
        );
        assert_eq!(
            fetcher.cache_path("a\\b"),
            PathBuf::from("/home/dev/.skillforge/cache/a_b")
        );
    }

    #[test]
    fn clear_cache_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("cache");
        std::fs::create_dir_all(cache.join("acme_skills")).unwrap();
        let fetcher = MarketplaceFetcher::new(&cache);

        assert!(fetcher.clear_cache().unwrap());
        assert!(!cache.exists());
        assert!(!fetcher.clear_cache().unwrap());
    }

    #[test]
    fn dot_names_never_touch_outside_the_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let config_dir = tmp.path().join("config");
        let cache = config_dir.join("cache");
        std::fs::create_dir_all(cache.join("other_market")).unwrap();
        let sentinel = config_dir.join("credentials.json");
        std::fs::write(&sentinel, "{}").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = MarketplaceFetcher::with_cloner(&cache, FixtureCloner {
            fixture: tmp.path().join("unused"),
            calls: Arc::clone(&calls),
        });

        for name in ["..", ".", ""] {
            let mut market = Marketplace {
                name: name.into(),
                source: "git@example.com:..".into(),
                location: MarketplaceLocation::GitUrl {
                    remote_url: "git@example.com:..".into(),
                },
                skills: vec![],
                checkout: None,
            };
            let err = fetcher.fetch_metadata(&mut market).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Fetch);
            assert!(market.checkout.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sentinel.is_file());
        assert!(cache.join("other_market").is_dir());
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    #[test]
    fn git_cli_reports_failed_clone() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let url = tmp.path().join("no-such-repo");
        let url = url.to_str().unwrap();

        let err = GitCli::default()
            .clone_shallow(url, &tmp.path().join("dest"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        let message = err.to_string();
        assert!(message.contains("git clone failed"), "{message}");
        assert!(message.contains(url), "{message}");
    }

    #[test]
    fn git_cli_kills_clone_past_deadline() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let url = tmp.path().join("no-such-repo");
        let url = url.to_str().unwrap();

        let err = GitCli::with_timeout(Duration::ZERO)
            .clone_shallow(url, &tmp.path().join("dest"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        let message = err.to_string();
        assert!(message.contains("timed out after 0s"), "{message}");
        assert!(message.contains(url), "{message}");
    }
}
