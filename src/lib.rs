//! Locate, decode and filter a website's XML sitemap.
//!
//! [`sitemap::fetch_sitemap`] turns a URL or bare domain into page records by
//! trying the usual sitemap locations in order; [`filter::apply`] narrows the
//! records with keyword and pattern criteria; [`export`] writes them out.

pub mod config;
pub mod export;
pub mod filter;
pub mod sitemap;
pub mod util;
