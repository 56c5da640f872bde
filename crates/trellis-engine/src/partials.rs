//! Partial discovery across the configured partial directories.

use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;

use crate::compiler::{Compiler, PartialMap};
use crate::engine::ViewEngine;
use crate::error::Error;
use crate::templates::{Artifact, TemplateOptions};

impl<C: Compiler> ViewEngine<C> {
    /// Compile every partial from every configured partial directory.
    ///
    /// Directories are scanned in parallel and merged in configuration order,
    /// so a later directory wins when two produce the same partial name.
    ///
    /// # Errors
    ///
    /// Fails if any directory listing or any partial fails.
    pub fn get_partials(
        &self,
        options: TemplateOptions,
    ) -> Result<BTreeMap<String, Artifact<C::Template>>, Error> {
        self.collect_partials(options.cache, |path| self.get_template(path, options))
    }

    /// Compiled partials for rendering.
    pub(crate) fn compiled_partials(&self, cache: bool) -> Result<PartialMap<C::Template>, Error> {
        self.collect_partials(cache, |path| self.compiled_template(path, cache))
    }

    /// Name under which the template at `relative` is registered as a partial.
    ///
    /// The extension is stripped and `namespace/` prepended when set. For
    /// compilers that cannot resolve `/` in partial names every `/` becomes
    /// `.`.
    #[must_use]
    pub fn partial_name(&self, relative: &str, namespace: Option<&str>) -> String {
        let stem = relative
            .strip_suffix(self.config.extname.as_str())
            .unwrap_or(relative);
        let name = match namespace {
            Some(namespace) => format!("{namespace}/{stem}"),
            None => stem.to_owned(),
        };

        if self.slash_partials {
            name
        } else {
            name.replace('/', ".")
        }
    }

    fn collect_partials<A, F>(&self, cache: bool, load: F) -> Result<BTreeMap<String, A>, Error>
    where
        A: Send,
        F: Fn(&Path) -> Result<A, Error> + Sync,
    {
        let per_dir = self
            .config
            .partials_dirs
            .par_iter()
            .map(|entry| {
                self.templates_in(&entry.dir, cache, &load)
                    .map(|templates| (entry, templates))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut partials = BTreeMap::new();
        for (entry, templates) in per_dir {
            for (relative, artifact) in templates {
                let name = self.partial_name(&relative, entry.namespace.as_deref());
                if partials.insert(name.clone(), artifact).is_some() {
                    tracing::debug!(
                        partial = %name,
                        dir = %entry.dir.display(),
                        "Partial overridden by later directory"
                    );
                }
            }
        }

        tracing::debug!(count = partials.len(), "Collected partials");
        Ok(partials)
    }
}
