//! Subcommand implementations. Results go to stdout, logs to stderr.

use std::io::Write;

use anyhow::{Result, bail};
use serde::Serialize;

use super::boot::Site;
use crate::generator::GeneratorId;
use crate::log;
use crate::resource::{ResourceId, ResourceType};
use crate::routing::RouteKind;
use crate::service::{NOT_FOUND_URL, UrlOptions};
use crate::urls::{format_conflicts, print_conflicts};

/// `urlmap resolve <url>`
pub fn resolve(site: &Site, url: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();

    match site.manager.dispatch(url) {
        Some(hit) => {
            writeln!(out, "route:    {} ({})", hit.router, hit.router_name)?;
            writeln!(out, "kind:     {}", kind_label(&hit.kind))?;
            for (name, value) in &hit.params {
                writeln!(out, "param:    {name} = {value}")?;
            }
            if let Some(listing) = &hit.listing {
                if !listing.templates.is_empty() {
                    writeln!(out, "template: {}", listing.templates.join(", "))?;
                }
                if let Some(limit) = listing.limit {
                    writeln!(out, "limit:    {limit}")?;
                }
                if let Some(order) = &listing.order {
                    writeln!(out, "order:    {order}")?;
                }
            }
            if let Some(entry) = hit.entry {
                writeln!(out, "resource: {} {}", entry.resource.resource_type, entry.resource.id)?;
                writeln!(out, "url:      {}", entry.url)?;
            }
        }
        None => {
            log!("resolve"; "no route serves {}", url);
        }
    }
    Ok(())
}

fn kind_label(kind: &RouteKind) -> String {
    match kind {
        RouteKind::Listing => "listing".to_string(),
        RouteKind::Entry => "entry".to_string(),
        RouteKind::Rss => "rss".to_string(),
        RouteKind::Edit => "edit".to_string(),
        RouteKind::Template(template) => format!("template ({template})"),
        RouteKind::Preview => "preview".to_string(),
        RouteKind::Email => "email".to_string(),
        RouteKind::Unsubscribe => "unsubscribe".to_string(),
        RouteKind::App(app) => format!("app ({app})"),
    }
}

/// `urlmap url <id>`
pub fn url(site: &Site, id: &str, absolute: bool) -> Result<()> {
    let id = ResourceId::new(id);
    let url = site.manager.get_url_by_resource_id(
        &id,
        UrlOptions {
            absolute,
            ..UrlOptions::default()
        },
    );
    if site.manager.get_resource_by_id(&id).is_err() {
        log!("warning"; "resource {} has no url, printing {}", id, NOT_FOUND_URL);
    }
    println!("{url}");
    Ok(())
}

#[derive(Serialize)]
struct DumpRow<'a> {
    url: &'a str,
    id: &'a str,
    #[serde(rename = "type")]
    resource_type: ResourceType,
    generator: u32,
    router: Option<String>,
}

/// `urlmap dump`
pub fn dump(site: &Site, json: bool) -> Result<()> {
    let entries = site.service.urls().entries();
    let generators = site.service.generators();
    let router_of = |uid: GeneratorId| {
        generators
            .iter()
            .find(|g| g.uid() == uid)
            .map(|g| g.identifier().to_string())
    };

    let rows: Vec<DumpRow> = entries
        .iter()
        .map(|e| DumpRow {
            url: e.url.as_str(),
            id: e.resource.id.as_str(),
            resource_type: e.resource.resource_type,
            generator: e.generator_id.0,
            router: router_of(e.generator_id),
        })
        .collect();

    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &rows)?;
        writeln!(out)?;
    } else {
        for row in &rows {
            writeln!(
                out,
                "{:<40} {:<8} {:<24} {}",
                row.url,
                row.resource_type.as_str(),
                row.id,
                row.router.as_deref().unwrap_or("-")
            )?;
        }
    }
    Ok(())
}

/// `urlmap check`
pub fn check(site: &Site, warn_only: bool) -> Result<()> {
    let conflicts = site.service.urls().conflicts();
    if conflicts.is_empty() {
        log!("check"; "{} urls, no conflicts", site.service.urls().len());
        return Ok(());
    }

    if warn_only {
        print_conflicts(&conflicts);
        return Ok(());
    }
    bail!("url conflicts:\n{}", format_conflicts(&conflicts))
}

/// `urlmap routes`
pub fn routes(site: &Site) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for route in site.manager.get_all_routes() {
        writeln!(out, "{:<20} {}", route.router, route.route)?;
    }
    if let Some(rss) = site.manager.get_rss_url(UrlOptions::default()) {
        log!("routes"; "site feed at {}", rss);
    }
    Ok(())
}
