#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use crate::config::ResolverConfig;
    use crate::error::PackageError;
    use crate::graph::{DependencyGraphBuilder, RootSource};
    use crate::package::{package_plain, package_self_contained, ModuleBundler};
    use crate::resource::{PathType, ResolvedGraph, ResourceDescription, ResourceType};

    /// Records every entry it is asked to bundle and echoes it back.
    #[derive(Default)]
    struct RecordingBundler {
        entries: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingBundler {
        fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl ModuleBundler for RecordingBundler {
        fn bundle(&self, entry: &str, _resolve_dir: &Path) -> Result<String, String> {
            self.entries.lock().unwrap().push(entry.to_string());
            if self.fail {
                return Err("Could not resolve \"./gone.js\"".to_string());
            }
            Ok(format!("// bundled\n{}", entry))
        }
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn decode(payload: &str) -> String {
        let (_, data) = payload.split_once(";base64,").unwrap();
        String::from_utf8(STANDARD.decode(data).unwrap()).unwrap()
    }

    fn fixture(dir: &Path) -> ResolvedGraph {
        write(dir, "a.js", "import { b } from './lib/b.js'; export const a = b;");
        write(dir, "lib/b.js", "export const b = 1;");
        write(dir, "chart.ojs", "c = FileAttachment(\"data/c.csv\").csv()");
        write(dir, "data/c.csv", "x,y\n1,2\n");
        write(dir, "d.json", "{\"k\": 1}");

        let root = RootSource::script(
            "import {a} from \"./a.js\"\nimport {c} from \"./chart.ojs\"\nd = FileAttachment(\"d.json\").json()",
            dir,
        );
        DependencyGraphBuilder::new(ResolverConfig::default())
            .build_graph(&root)
            .unwrap()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SELF-CONTAINED MODE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_modules_share_one_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture(dir.path());
        let bundler = RecordingBundler::default();

        let inlined =
            package_self_contained(&graph, &ResolverConfig::default(), &bundler).unwrap();

        assert_eq!(bundler.entries().len(), 1);
        let a = &inlined["./a.js"];
        let b = &inlined["./lib/b.js"];
        assert_eq!(a, b);
        assert_eq!(a.mime_type, "application/javascript");
        assert!(a.payload.starts_with("data:application/javascript;base64,"));

        let entry = &bundler.entries()[0];
        assert!(entry.contains(&dir.path().join("a.js").to_string_lossy().to_string()));
        assert!(entry.contains(&dir.path().join("lib/b.js").to_string_lossy().to_string()));
        assert!(decode(&a.payload).starts_with("// bundled"));
    }

    #[test]
    fn test_script_modules_and_attachments_inlined_individually() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture(dir.path());
        let bundler = RecordingBundler::default();

        let inlined =
            package_self_contained(&graph, &ResolverConfig::default(), &bundler).unwrap();

        let chart = &inlined["./chart.ojs"];
        assert_eq!(chart.mime_type, "text/plain");
        assert_eq!(decode(&chart.payload), "c = FileAttachment(\"data/c.csv\").csv()");

        let data = &inlined["./d.json"];
        assert_eq!(data.mime_type, "application/json");
        assert_eq!(decode(&data.payload), "{\"k\": 1}");

        // Attachments found inside modules are keyed by filename, not literal
        let csv = &inlined["./data/c.csv"];
        assert_eq!(csv.mime_type, "text/csv");
        assert!(!inlined.contains_key("data/c.csv"));

        assert_eq!(inlined.len(), 5);
    }

    #[test]
    fn test_bundle_input_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture(dir.path());
        let mut reversed = graph.clone();
        reversed.resources.reverse();

        let first = RecordingBundler::default();
        let second = RecordingBundler::default();
        let config = ResolverConfig::default();
        let one = package_self_contained(&graph, &config, &first).unwrap();
        let two = package_self_contained(&reversed, &config, &second).unwrap();

        assert_eq!(first.entries(), second.entries());
        assert_eq!(one["./a.js"], two["./a.js"]);
    }

    #[test]
    fn test_no_modules_skips_bundler() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "d.json", "{}");
        let root = RootSource::script("d = FileAttachment(\"d.json\")", dir.path());
        let graph = DependencyGraphBuilder::default().build_graph(&root).unwrap();

        let bundler = RecordingBundler::default();
        let inlined =
            package_self_contained(&graph, &ResolverConfig::default(), &bundler).unwrap();
        assert!(bundler.entries().is_empty());
        assert_eq!(inlined.len(), 1);
    }

    #[test]
    fn test_bundle_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture(dir.path());
        let bundler = RecordingBundler {
            fail: true,
            ..Default::default()
        };

        match package_self_contained(&graph, &ResolverConfig::default(), &bundler) {
            Err(PackageError::Bundle { count, message }) => {
                assert_eq!(count, 2);
                assert!(message.contains("gone.js"));
            }
            other => panic!("expected bundle failure, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_same_import_string_for_different_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x/m.ojs", "import {h} from \"./helper.ojs\"");
        write(dir.path(), "y/m.ojs", "import {h} from \"./helper.ojs\"");
        write(dir.path(), "x/helper.ojs", "h = \"x\"");
        write(dir.path(), "y/helper.ojs", "h = \"y\"");

        let root = RootSource::script(
            "import {m} from \"./x/m.ojs\"\nimport {m as n} from \"./y/m.ojs\"",
            dir.path(),
        );
        let graph = DependencyGraphBuilder::default().build_graph(&root).unwrap();
        let inlined =
            package_self_contained(&graph, &ResolverConfig::default(), &RecordingBundler::default())
                .unwrap();

        let keys: Vec<&str> = inlined.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["./x/m.ojs", "./y/m.ojs", "./helper.ojs", "./y/helper.ojs"]);
        assert_eq!(decode(&inlined["./helper.ojs"].payload), "h = \"x\"");
        assert_eq!(decode(&inlined["./y/helper.ojs"].payload), "h = \"y\"");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vanished.csv");
        let graph = ResolvedGraph {
            root_dir: dir.path().to_path_buf(),
            resources: vec![ResourceDescription {
                filename: "./vanished.csv".to_string(),
                referent: None,
                import_path: "vanished.csv".to_string(),
                path_type: PathType::Relative,
                resource_type: ResourceType::Attachment,
                path,
            }],
            ..Default::default()
        };

        let result = package_self_contained(
            &graph,
            &ResolverConfig::default(),
            &RecordingBundler::default(),
        );
        assert!(matches!(result, Err(PackageError::Read { .. })));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // PLAIN MODE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_plain_filenames_in_traversal_order() {
        let dir = tempfile::tempdir().unwrap();
        let graph = fixture(dir.path());
        assert_eq!(
            package_plain(&graph),
            vec!["./a.js", "./chart.ojs", "./d.json", "./lib/b.js", "./data/c.csv"]
        );
    }

    #[test]
    fn test_plain_dedupes_filenames() {
        let resource = |filename: &str, path: &str, resource_type| ResourceDescription {
            filename: filename.to_string(),
            referent: None,
            import_path: filename.to_string(),
            path_type: PathType::Relative,
            resource_type,
            path: PathBuf::from(path),
        };
        let graph = ResolvedGraph {
            resources: vec![
                resource("./a.js", "/p/a.js", ResourceType::Import),
                resource("./notes.md", "/p/notes.md", ResourceType::Attachment),
                resource("./a.js", "/p/a.js", ResourceType::Import),
                resource("./b.js", "/p/b.js", ResourceType::Import),
            ],
            ..Default::default()
        };
        assert_eq!(package_plain(&graph), vec!["./a.js", "./notes.md", "./b.js"]);
    }

    #[test]
    fn test_document_attachment_is_packaged() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.md", "# Notes\n");
        let root = RootSource::script("notes = FileAttachment(\"notes.md\").text()", dir.path());
        let graph = DependencyGraphBuilder::default().build_graph(&root).unwrap();
        assert_eq!(package_plain(&graph), vec!["./notes.md"]);
    }
}
