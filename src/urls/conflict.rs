//! Reporting of urls claimed by more than one resource.
//!
//! Collisions are legal while the table settles; lookups resolve them by
//! generator precedence. These helpers surface them for `urlmap check`.

use crate::core::UrlPath;
use crate::generator::GeneratorId;
use crate::log;
use crate::logger::plural_s;
use crate::resource::ResourceId;

/// A url with every (generator, resource) pair claiming it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlConflict {
    pub url: UrlPath,
    pub claims: Vec<(GeneratorId, ResourceId)>,
}

impl UrlConflict {
    /// The claim that wins resolution: lowest generator position.
    pub fn winner(&self) -> Option<&(GeneratorId, ResourceId)> {
        self.claims.iter().min_by_key(|(generator, _)| *generator)
    }
}

/// Print conflicts using the standard log format.
///
/// ```text
/// [error] url conflicts (1 url, 2 resources)
/// [url] /shared/ (2 resources)
///   - 5f1 (generator #0, wins)
///   - 7a2 (generator #3)
/// ```
pub fn print_conflicts(conflicts: &[UrlConflict]) {
    if conflicts.is_empty() {
        return;
    }

    let total: usize = conflicts.iter().map(|c| c.claims.len()).sum();
    log!("error"; "url conflicts ({} url{}, {} resource{})",
        conflicts.len(), plural_s(conflicts.len()),
        total, plural_s(total));

    for conflict in conflicts {
        eprintln!();
        log!("url"; "{} ({} resource{})", conflict.url, conflict.claims.len(), plural_s(conflict.claims.len()));
        for line in claim_lines(conflict) {
            eprintln!("{line}");
        }
    }
}

/// Format conflicts as a string (for error messages).
pub fn format_conflicts(conflicts: &[UrlConflict]) -> String {
    conflicts
        .iter()
        .map(|conflict| {
            let mut lines = vec![format!("{} ({})", conflict.url, conflict.claims.len())];
            lines.extend(claim_lines(conflict));
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn claim_lines(conflict: &UrlConflict) -> Vec<String> {
    let winner = conflict.winner().map(|(g, id)| (*g, id.clone()));
    conflict
        .claims
        .iter()
        .map(|(generator, id)| {
            let wins = winner.as_ref().is_some_and(|(g, w)| g == generator && w == id);
            format!(
                "  - {} (generator #{}{})",
                id,
                generator.0,
                if wins { ", wins" } else { "" }
            )
        })
        .collect()
}
