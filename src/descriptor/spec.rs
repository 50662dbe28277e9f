// src/descriptor/spec.rs

//! RPM spec file rendering
//!
//! The tree is unpacked and pruned before rpmbuild runs, so `%prep` and
//! `%build` are empty and `%install` only copies prepared sources into the
//! build root. `%files` is generated from the manifest rather than globbed,
//! which keeps the package contents in lockstep with the pruned tree.

use super::PackageDescriptor;
use crate::config::DependencyGeneration;
use crate::tree::EntryKind;

/// Escape rpm macro expansion
fn escape_macros(s: &str) -> String {
    s.replace('%', "%%")
}

/// Quote a path for a `%files` line, escaping macros and glob characters
fn files_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 2);
    out.push('"');
    for c in escape_macros(path).chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Escape a path for use inside a double-quoted shell word
fn shell_escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in escape_macros(path).chars() {
        if matches!(c, '"' | '$' | '`' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Install location of an icon given its path inside the icon directory
pub(crate) fn icon_install_path(relative: &str) -> String {
    match relative.strip_prefix("pixmaps/") {
        Some(rest) => format!("%{{_datadir}}/pixmaps/{}", rest),
        None => format!("%{{_datadir}}/icons/{}", relative),
    }
}

fn header_line(out: &mut String, tag: &str, value: &str) {
    out.push_str(&format!("{:<16}{}\n", format!("{}:", tag), value));
}

/// Render the spec file for `descriptor`
pub fn render(d: &PackageDescriptor) -> String {
    let prefix = d.install_prefix_str();
    let mut out = String::new();

    out.push_str("%define __jar_repack 0\n");
    out.push_str("%define debug_package %{nil}\n");
    out.push_str("%define __os_install_post %{nil}\n\n");

    header_line(&mut out, "Name", &d.name);
    header_line(&mut out, "Version", &d.version);
    header_line(&mut out, "Release", &format!("{}%{{?dist}}", d.release));
    header_line(&mut out, "Summary", &escape_macros(&d.summary));
    header_line(&mut out, "License", &escape_macros(&d.license));
    if let Some(url) = &d.url {
        header_line(&mut out, "URL", &escape_macros(url));
    }
    if let Some(archive) = &d.archive_file {
        header_line(&mut out, "Source0", &escape_macros(archive));
    }
    header_line(&mut out, "Source1", &format!("{}.desktop", d.name));
    header_line(&mut out, "ExclusiveArch", d.arch.rpm_arch());
    if d.dependency_generation == DependencyGeneration::Disabled {
        header_line(&mut out, "AutoReqProv", "no");
    }
    header_line(&mut out, "BuildRequires", "desktop-file-utils");

    out.push_str("\n%description\n");
    out.push_str(&escape_macros(d.description.trim_end()));
    out.push('\n');

    out.push_str("\n%prep\n# Sources are unpacked and pruned before rpmbuild runs\n");
    out.push_str("\n%build\n# Binary release, nothing to build\n");

    out.push_str("\n%install\n");
    out.push_str("rm -rf %{buildroot}\n");
    out.push_str(&format!("mkdir -p \"%{{buildroot}}{}\"\n", shell_escape(&prefix)));
    out.push_str(&format!(
        "cp -a \"%{{_sourcedir}}/{}/.\" \"%{{buildroot}}{}/\"\n",
        shell_escape(&d.tree_dir),
        shell_escape(&prefix)
    ));
    for icon in &d.icons {
        out.push_str(&format!(
            "install -D -m 0644 \"%{{_sourcedir}}/{}/{}\" \"%{{buildroot}}{}\"\n",
            shell_escape(&d.icon_dir),
            shell_escape(icon),
            icon_install_path(icon)
        ));
    }
    out.push_str(
        "desktop-file-install --dir=%{buildroot}%{_datadir}/applications %{SOURCE1}\n",
    );
    if d.link_launcher {
        out.push_str("mkdir -p %{buildroot}%{_bindir}\n");
        out.push_str(&format!(
            "ln -sf \"{}/{}\" \"%{{buildroot}}%{{_bindir}}/{}\"\n",
            shell_escape(&prefix),
            shell_escape(&d.launcher),
            d.name
        ));
    }

    out.push_str("\n%files\n");
    out.push_str(&format!("%dir {}\n", files_path(&prefix)));
    for dir in d.manifest.directories() {
        out.push_str(&format!("%dir {}\n", files_path(&dir.install)));
    }
    for file in d.manifest.files() {
        let mode = match file.kind {
            EntryKind::Symlink => "-".to_string(),
            _ => format!("{:04o}", file.mode),
        };
        out.push_str(&format!(
            "%attr({},root,root) {}\n",
            mode,
            files_path(&file.install)
        ));
    }
    out.push_str(&format!("%{{_datadir}}/applications/{}.desktop\n", d.name));
    for icon in &d.icons {
        out.push_str(&format!("{}\n", icon_install_path(icon)));
    }
    if d.link_launcher {
        out.push_str(&format!("%{{_bindir}}/{}\n", d.name));
    }

    // rpm rejects undated entries, so there is none unless a date is configured
    if let Some(entry) = &d.changelog {
        out.push_str("\n%changelog\n");
        out.push_str(&format!(
            "* {} {} - {}-{}\n- {}\n",
            entry.date.format("%a %b %d %Y"),
            escape_macros(&entry.packager),
            d.version,
            d.release,
            escape_macros(&entry.text)
        ));
    }

    out
}
