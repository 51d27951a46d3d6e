//! Process-wide template cache. Templates are compiled per (column kind,
//! token shape, delimiter); sessions share compiled templates so a shape seen
//! by one stream warms every later stream.
//!
//! Lookups take a read lock; a miss compiles outside any lock and inserts
//! under a write lock. Two sessions racing on the same shape may both compile,
//! the first insert wins and the loser's work is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use xxhash_rust::xxh3::Xxh3Builder;

use crate::error::ValuesResult;
use crate::expr::Expr;
use crate::lexer::Token;
use crate::template::{shape_of, CompiledTemplate, ShapeItem};
use crate::types::DataKind;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TemplateKey {
    kind: DataKind,
    nullable: bool,
    null_as_default: bool,
    shape: Vec<ShapeItem>,
    delimiter: u8,
}

struct CacheSlot {
    template: Arc<CompiledTemplate>,
    last_used: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Unbounded,
    Lru(usize),
}

pub struct TemplateCache {
    policy: CachePolicy,
    tick: AtomicU64,
    map: RwLock<HashMap<TemplateKey, CacheSlot, Xxh3Builder>>,
}

static GLOBAL: Lazy<Arc<TemplateCache>> =
    Lazy::new(|| Arc::new(TemplateCache::new(CachePolicy::Lru(DEFAULT_CAPACITY))));

impl TemplateCache {
    pub fn new(policy: CachePolicy) -> Self {
        TemplateCache {
            policy,
            tick: AtomicU64::new(0),
            map: RwLock::new(HashMap::with_hasher(Xxh3Builder::new())),
        }
    }

    /// The shared process-wide cache.
    pub fn global() -> Arc<TemplateCache> {
        GLOBAL.clone()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the template for an expression's token shape, compiling and
    /// inserting it on a miss. The flag reports whether the lookup was a hit.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_construct(
        &self,
        tokens: &[Token],
        start: usize,
        end: usize,
        ast: &Expr,
        kind: &DataKind,
        nullable: bool,
        null_as_default: bool,
        delimiter: u8,
    ) -> ValuesResult<(Arc<CompiledTemplate>, bool)> {
        let key = TemplateKey {
            kind: kind.clone(),
            nullable,
            null_as_default,
            shape: shape_of(tokens, start, end),
            delimiter,
        };
        let now = self.tick.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = self.map.read().get(&key) {
            slot.last_used.store(now, Ordering::Relaxed);
            return Ok((slot.template.clone(), true));
        }

        let compiled = Arc::new(CompiledTemplate::with_shape(
            key.shape.clone(),
            ast,
            kind.clone(),
            nullable,
            null_as_default,
            delimiter,
        )?);
        tracing::debug!(
            kind = %kind.name(),
            shape_len = key.shape.len(),
            params = compiled.param_count(),
            "compiled column template"
        );

        let mut map = self.map.write();
        let slot = map.entry(key).or_insert(CacheSlot {
            template: compiled,
            last_used: AtomicU64::new(now),
        });
        let out = slot.template.clone();
        if let CachePolicy::Lru(cap) = self.policy {
            while map.len() > cap.max(1) {
                let oldest = map
                    .iter()
                    .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        map.remove(&k);
                        tracing::debug!("evicted least recently used template");
                    }
                    None => break,
                }
            }
        }
        Ok((out, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;
    use crate::lexer::{lex_row, TokenCursor};

    fn tokens_and_ast(src: &str) -> (Vec<Token>, usize, Expr) {
        let toks = lex_row(src.as_bytes(), 0);
        let mut tc = TokenCursor::new(&toks, 0, 64, 1000);
        let ast = parse_expression(&mut tc).unwrap();
        let end = tc.idx();
        (toks, end, ast)
    }

    fn get(cache: &TemplateCache, src: &str, kind: DataKind) -> (Arc<CompiledTemplate>, bool) {
        let (toks, end, ast) = tokens_and_ast(src);
        cache
            .get_or_construct(&toks, 0, end, &ast, &kind, false, false, b',')
            .unwrap()
    }

    #[test]
    fn same_shape_hits() {
        let cache = TemplateCache::new(CachePolicy::Unbounded);
        let (a, hit_a) = get(&cache, "now() + 1", DataKind::Datetime);
        let (b, hit_b) = get(&cache, "now() + 99", DataKind::Datetime);
        assert!(!hit_a);
        assert!(hit_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn kind_and_delimiter_partition_the_cache() {
        let cache = TemplateCache::new(CachePolicy::Unbounded);
        let _ = get(&cache, "1 + 2", DataKind::Int64);
        let _ = get(&cache, "1 + 2", DataKind::Float64);
        assert_eq!(cache.len(), 2);

        let (toks, end, ast) = tokens_and_ast("1 + 2");
        cache
            .get_or_construct(&toks, 0, end, &ast, &DataKind::Int64, false, false, b')')
            .unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn lru_evicts_oldest() {
        let cache = TemplateCache::new(CachePolicy::Lru(2));
        let _ = get(&cache, "abs(1)", DataKind::Int64);
        let _ = get(&cache, "1 + 2", DataKind::Int64);
        // Touch the first so the second becomes the eviction victim.
        let _ = get(&cache, "abs(7)", DataKind::Int64);
        let _ = get(&cache, "upper('x')", DataKind::Str);
        assert_eq!(cache.len(), 2);
        // abs survives as a hit, the arithmetic shape was evicted.
        let before = cache.len();
        let _ = get(&cache, "abs(2)", DataKind::Int64);
        assert_eq!(cache.len(), before);
    }

    #[test]
    fn global_cache_is_shared() {
        let a = TemplateCache::global();
        let b = TemplateCache::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
