//! Dockerfile rendering for a recipe.

use crate::recipe::Recipe;
use diagbox_core::config::RunnerConfig;
use std::fmt::Write as _;

/// Render the Dockerfile equivalent of `recipe`. RUN lines use the same
/// command templates as the local runner.
pub fn render_dockerfile(recipe: &Recipe, commands: &RunnerConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "FROM {}", recipe.base);
    let _ = writeln!(out);
    let _ = writeln!(out, "WORKDIR {}", recipe.workdir);

    if !recipe.env.is_empty() {
        let _ = writeln!(out);
        for (key, value) in &recipe.env {
            let quoted = serde_json::to_string(value).unwrap_or_default();
            let _ = writeln!(out, "ENV {key}={quoted}");
        }
    }

    if !recipe.system_packages.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "RUN {}", commands.system_install(&recipe.system_packages));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "COPY {0} ./{0}", recipe.manifest);
    let _ = writeln!(out, "RUN {}", commands.manifest_install(&recipe.manifest));

    let _ = writeln!(out);
    let _ = writeln!(out, "COPY . ./");

    let _ = writeln!(out);
    let _ = writeln!(out, "RUN mkdir -p {}", recipe.provision_dirs.join(" "));

    let _ = writeln!(out);
    let _ = writeln!(out, "EXPOSE {}", recipe.port);

    let _ = writeln!(out);
    let argv = serde_json::to_string(&recipe.entrypoint).unwrap_or_default();
    let _ = writeln!(out, "CMD {argv}");
    out
}
