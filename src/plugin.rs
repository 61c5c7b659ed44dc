//! Plugins installed on disk.
//!
//! A plugin is a directory `<home>/plugins/<name>/` holding a `plugin.json` manifest
//! whose `commands` map glyph names to executables relative to the plugin directory.
//! Plugins can also ship as a zip archive (`<name>.sigin`) with the manifest at its root;
//! archives are unpacked into `<home>/plugins/<manifest name>/`.

use crate::error::{Result, SigilError};
use crate::external::ExternalGlyph;
use crate::journal::copy_recursive;
use crate::registry::{GlyphRegistry, Origin};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};
use zip::ZipArchive;

pub const MANIFEST_FILE: &str = "plugin.json";
pub const ARCHIVE_EXTENSION: &str = "sigin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Glyph name → executable path relative to the plugin directory.
    #[serde(default)]
    pub commands: IndexMap<String, PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Plugin {
    pub manifest: PluginManifest,
    pub dir: PathBuf,
}

fn valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && name != "."
        && name != ".."
}

fn plugin_error(path: &Path, err: impl std::fmt::Display) -> SigilError {
    SigilError::Plugin(format!("{}: {err}", path.display()))
}

/// Read and check the manifest of the plugin in `dir`.
pub fn read_manifest(dir: &Path) -> Result<PluginManifest> {
    let path = dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&path).map_err(|e| plugin_error(&path, e))?;
    parse_manifest(&text, &path)
}

fn parse_manifest(text: &str, path: &Path) -> Result<PluginManifest> {
    let manifest: PluginManifest = serde_json::from_str(text).map_err(|e| plugin_error(path, e))?;
    if !valid_plugin_name(&manifest.name) {
        return Err(SigilError::Plugin(format!(
            "invalid plugin name `{}`",
            manifest.name
        )));
    }
    Ok(manifest)
}

/// Whether `path` is a plugin archive rather than a plugin directory.
pub fn is_archive(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == ARCHIVE_EXTENSION || ext.eq_ignore_ascii_case("zip"))
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| plugin_error(path, e))?;
    ZipArchive::new(file).map_err(|e| plugin_error(path, e))
}

fn archive_manifest(archive: &mut ZipArchive<File>, path: &Path) -> Result<PluginManifest> {
    let mut text = String::new();
    archive
        .by_name(MANIFEST_FILE)
        .map_err(|e| plugin_error(path, format!("{MANIFEST_FILE}: {e}")))?
        .read_to_string(&mut text)
        .map_err(|e| plugin_error(path, e))?;
    parse_manifest(&text, path)
}

/// Unpack `archive` into `dir`. A partial extraction is removed again.
fn extract(archive: &mut ZipArchive<File>, path: &Path, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    if let Err(err) = archive.extract(dir) {
        if let Err(cleanup) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), "failed to clean up partial unpack: {cleanup}");
        }
        return Err(plugin_error(path, err));
    }
    Ok(())
}

/// Unpack archives dropped into `plugins_dir` that have no directory yet.
fn unpack_archives(plugins_dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let mut archives: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_archive(p))
        .collect();
    archives.sort();

    for path in archives {
        let unpacked = open_archive(&path).and_then(|mut archive| {
            let manifest = archive_manifest(&mut archive, &path)?;
            let dir = plugins_dir.join(&manifest.name);
            if !dir.exists() {
                extract(&mut archive, &path, &dir)?;
                debug!(plugin = %manifest.name, "unpacked plugin archive");
            }
            Ok(())
        });
        if let Err(err) = unpacked {
            warn!(archive = %path.display(), "skipping plugin archive: {err}");
        }
    }
    Ok(())
}

/// Installed plugins, sorted by directory name. Unreadable ones are logged and skipped.
pub fn discover(plugins_dir: &Path) -> Result<Vec<Plugin>> {
    let entries = match fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut plugins = Vec::new();
    for dir in dirs {
        match read_manifest(&dir) {
            Ok(manifest) => plugins.push(Plugin { manifest, dir }),
            Err(err) => warn!(dir = %dir.display(), "skipping plugin: {err}"),
        }
    }
    Ok(plugins)
}

/// Register the commands of `plugin`, returning the ones that were refused.
pub fn register(registry: &mut GlyphRegistry, plugin: &Plugin) -> Vec<SigilError> {
    let summary = plugin
        .manifest
        .description
        .clone()
        .unwrap_or_else(|| format!("from plugin {}", plugin.manifest.name));
    let mut refused = Vec::new();
    for (glyph, program) in &plugin.manifest.commands {
        let external = ExternalGlyph::new(glyph.as_str(), plugin.dir.join(program), summary.clone());
        let origin = Origin::Plugin(plugin.manifest.name.clone());
        if let Err(err) = registry.register(glyph, Rc::new(external), origin) {
            refused.push(err);
        }
    }
    refused
}

/// Load every installed plugin. Conflicting commands are logged and skipped.
pub fn load_all(registry: &mut GlyphRegistry, plugins_dir: &Path) -> Result<Vec<Plugin>> {
    unpack_archives(plugins_dir)?;
    let plugins = discover(plugins_dir)?;
    for plugin in &plugins {
        for err in register(registry, plugin) {
            warn!(plugin = %plugin.manifest.name, "{err}");
        }
        debug!(plugin = %plugin.manifest.name, "loaded plugin");
    }
    Ok(plugins)
}

/// Copy or unpack the plugin at `source` into `plugins_dir` and register its commands.
///
/// `source` is a plugin directory or a `.sigin`/`.zip` archive. If any command collides
/// with an existing glyph the copy is removed, nothing stays registered and the conflict
/// is returned.
pub fn install(registry: &mut GlyphRegistry, plugins_dir: &Path, source: &Path) -> Result<Plugin> {
    let mut archive = if is_archive(source) {
        Some(open_archive(source)?)
    } else {
        None
    };
    let manifest = match archive.as_mut() {
        Some(archive) => archive_manifest(archive, source)?,
        None => read_manifest(source)?,
    };
    let dir = plugins_dir.join(&manifest.name);
    if dir.exists() {
        return Err(SigilError::Plugin(format!(
            "plugin `{}` is already installed",
            manifest.name
        )));
    }
    fs::create_dir_all(plugins_dir)?;
    match archive.as_mut() {
        Some(archive) => extract(archive, source, &dir)?,
        None => copy_recursive(source, &dir)?,
    }

    let plugin = Plugin { manifest, dir };
    let mut refused = register(registry, &plugin);
    if !refused.is_empty() {
        registry.unregister_plugin(&plugin.manifest.name);
        if let Err(err) = fs::remove_dir_all(&plugin.dir) {
            warn!(dir = %plugin.dir.display(), "failed to roll back plugin copy: {err}");
        }
        return Err(refused.remove(0));
    }
    debug!(plugin = %plugin.manifest.name, "installed plugin");
    Ok(plugin)
}

/// Unregister the commands of plugin `name` and delete its directory.
pub fn remove(registry: &mut GlyphRegistry, plugins_dir: &Path, name: &str) -> Result<Vec<String>> {
    if !valid_plugin_name(name) {
        return Err(SigilError::Plugin(format!("invalid plugin name `{name}`")));
    }
    let dir = plugins_dir.join(name);
    if !dir.is_dir() {
        return Err(SigilError::Plugin(format!("no plugin named `{name}`")));
    }
    let removed = registry.unregister_plugin(name);
    fs::remove_dir_all(&dir)?;
    let archive = plugins_dir.join(format!("{name}.{ARCHIVE_EXTENSION}"));
    if archive.is_file() {
        fs::remove_file(&archive)?;
    }
    debug!(plugin = name, "removed plugin");
    Ok(removed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::command::{ExitCode, Glyph};
    use crate::session::Session;

    /// Write a plugin directory whose commands are POSIX shell scripts.
    pub(crate) fn write_plugin(root: &Path, name: &str, commands: &[(&str, &str)]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("bin")).unwrap();
        let mut map = IndexMap::new();
        for (glyph, body) in commands {
            let program = PathBuf::from("bin").join(glyph);
            let path = dir.join(&program);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            map.insert(glyph.to_string(), program);
        }
        let manifest = PluginManifest {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: Some(format!("{name} test plugin")),
            commands: map,
        };
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
        dir
    }

    /// Pack the files under `plugin_dir` into a zip archive at `archive`.
    pub(crate) fn write_archive(plugin_dir: &Path, archive: &Path) {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        fn walk(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, files);
                } else {
                    files.push(path.strip_prefix(root).unwrap().to_path_buf());
                }
            }
        }

        let mut files = Vec::new();
        walk(plugin_dir, plugin_dir, &mut files);
        files.sort();

        let mut writer = zip::ZipWriter::new(File::create(archive).unwrap());
        for relative in files {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let options = SimpleFileOptions::default().unix_permissions(0o755);
            writer.start_file(name, options).unwrap();
            writer
                .write_all(&fs::read(plugin_dir.join(&relative)).unwrap())
                .unwrap();
        }
        writer.finish().unwrap();
    }

    struct Taken;

    impl Glyph for Taken {
        fn name(&self) -> &str {
            "taken"
        }

        fn invoke(&self, _args: &[String], _session: &mut Session) -> anyhow::Result<ExitCode> {
            Ok(0)
        }
    }

    #[test]
    fn test_manifest_parsing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name": "greet", "version": "0.1", "commands": {"hello": "bin/hello"}}"#,
        )
        .unwrap();
        let manifest = read_manifest(dir.path()).unwrap();
        assert_eq!(manifest.name, "greet");
        assert_eq!(manifest.description, None);
        assert_eq!(manifest.commands["hello"], PathBuf::from("bin/hello"));

        fs::write(dir.path().join(MANIFEST_FILE), r#"{"name": "../x", "version": "1"}"#).unwrap();
        assert!(matches!(read_manifest(dir.path()), Err(SigilError::Plugin(_))));
    }

    #[test]
    fn test_load_all_skips_conflicts_but_keeps_rest() {
        let home = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        write_plugin(&plugins_dir, "tools", &[("taken", "true"), ("fresh", "true")]);
        fs::create_dir_all(plugins_dir.join("broken")).unwrap();

        let mut registry = GlyphRegistry::new();
        registry.register("taken", Rc::new(Taken), Origin::Builtin).unwrap();
        let plugins = load_all(&mut registry, &plugins_dir).unwrap();

        assert_eq!(plugins.len(), 1);
        assert_eq!(registry.origin("taken"), Some(&Origin::Builtin));
        assert_eq!(registry.origin("fresh"), Some(&Origin::Plugin("tools".into())));
    }

    #[test]
    fn test_install_conflict_rolls_back() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        let src = write_plugin(source.path(), "clash", &[("ok", "true"), ("taken", "true")]);

        let mut registry = GlyphRegistry::new();
        registry.register("taken", Rc::new(Taken), Origin::Builtin).unwrap();
        let err = install(&mut registry, &plugins_dir, &src).unwrap_err();

        assert!(matches!(err, SigilError::GlyphConflict { .. }));
        assert!(!registry.contains("ok"));
        assert!(!plugins_dir.join("clash").exists());
    }

    #[test]
    fn test_install_and_remove() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        let src = write_plugin(source.path(), "greet", &[("hello", "echo hi")]);

        let mut registry = GlyphRegistry::new();
        let plugin = install(&mut registry, &plugins_dir, &src).unwrap();
        assert_eq!(plugin.dir, plugins_dir.join("greet"));
        assert!(registry.contains("hello"));
        assert!(install(&mut registry, &plugins_dir, &src).is_err());

        assert_eq!(remove(&mut registry, &plugins_dir, "greet").unwrap(), vec!["hello"]);
        assert!(!registry.contains("hello"));
        assert!(!plugins_dir.join("greet").exists());
        assert!(remove(&mut registry, &plugins_dir, "greet").is_err());
    }

    #[test]
    fn test_install_from_archive() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        let src = write_plugin(source.path(), "greet", &[("hello", "echo hi")]);
        let archive = source.path().join("greet.sigin");
        write_archive(&src, &archive);
        assert!(is_archive(&archive));
        assert!(!is_archive(&src));

        let mut registry = GlyphRegistry::new();
        let plugin = install(&mut registry, &plugins_dir, &archive).unwrap();
        assert_eq!(plugin.manifest.name, "greet");
        assert_eq!(plugin.dir, plugins_dir.join("greet"));
        assert!(plugins_dir.join("greet").join(MANIFEST_FILE).is_file());
        assert!(plugins_dir.join("greet/bin/hello").is_file());
        assert_eq!(registry.origin("hello"), Some(&Origin::Plugin("greet".into())));
        assert!(matches!(
            install(&mut registry, &plugins_dir, &archive),
            Err(SigilError::Plugin(_))
        ));
    }

    #[test]
    fn test_install_archive_conflict_rolls_back() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        let src = write_plugin(source.path(), "clash", &[("ok", "true"), ("taken", "true")]);
        let archive = source.path().join("clash.sigin");
        write_archive(&src, &archive);

        let mut registry = GlyphRegistry::new();
        registry.register("taken", Rc::new(Taken), Origin::Builtin).unwrap();
        let err = install(&mut registry, &plugins_dir, &archive).unwrap_err();

        assert!(matches!(err, SigilError::GlyphConflict { .. }));
        assert!(!registry.contains("ok"));
        assert!(!plugins_dir.join("clash").exists());
    }

    #[test]
    fn test_archive_without_manifest_is_refused() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        let content = source.path().join("content");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("README"), "nothing here").unwrap();
        let archive = source.path().join("empty.sigin");
        write_archive(&content, &archive);

        let mut registry = GlyphRegistry::new();
        let err = install(&mut registry, &plugins_dir, &archive).unwrap_err();
        assert!(matches!(err, SigilError::Plugin(_)));
        assert!(!plugins_dir.exists() || fs::read_dir(&plugins_dir).unwrap().next().is_none());
    }

    #[test]
    fn test_load_all_unpacks_dropped_archives() {
        let home = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let plugins_dir = home.path().join("plugins");
        fs::create_dir_all(&plugins_dir).unwrap();
        let src = write_plugin(source.path(), "tools", &[("fresh", "true")]);
        write_archive(&src, &plugins_dir.join("tools.sigin"));
        fs::write(plugins_dir.join("junk.sigin"), "not a zip").unwrap();

        let mut registry = GlyphRegistry::new();
        let plugins = load_all(&mut registry, &plugins_dir).unwrap();

        assert_eq!(plugins.len(), 1);
        assert!(plugins_dir.join("tools").join(MANIFEST_FILE).is_file());
        assert_eq!(registry.origin("fresh"), Some(&Origin::Plugin("tools".into())));

        assert_eq!(remove(&mut registry, &plugins_dir, "tools").unwrap(), vec!["fresh"]);
        assert!(!plugins_dir.join("tools.sigin").exists());
        assert!(plugins_dir.join("junk.sigin").exists());
    }
}
